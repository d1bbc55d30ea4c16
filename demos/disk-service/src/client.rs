//! Typed client for the disk service

use std::sync::Arc;

use dcerpc::{ChannelConfig, Dispatcher, LocalChannel, RpcChannel};
use dcom::{Ipid, ObjectProxy};
use midl_ndr::NdrWString;

use crate::server::{disk_interface, syntax, DiskStore};
use crate::types::{
    DiskList, GetDiskIdFromName, ObjectId, QueryDisks, UninstallDisks, UninstallDisksIn,
    UninstallDisksOut,
};

pub struct DiskClient<C: RpcChannel + ?Sized> {
    proxy: ObjectProxy<C>,
}

impl<C: RpcChannel + ?Sized> DiskClient<C> {
    pub fn new(proxy: ObjectProxy<C>) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &ObjectProxy<C> {
        &self.proxy
    }

    /// List up to `max` disks, all of them for 0.
    pub async fn query_disks(&self, max: u32) -> dcom::Result<DiskList> {
        self.proxy.call::<QueryDisks>(&max).await
    }

    pub async fn uninstall_disks(&self, ids: Vec<ObjectId>, force: bool) -> dcom::Result<UninstallDisksOut> {
        self.proxy
            .call::<UninstallDisks>(&UninstallDisksIn::new(ids, force))
            .await
    }

    pub async fn disk_id_from_name(&self, name: &str) -> dcom::Result<ObjectId> {
        self.proxy
            .call::<GetDiskIdFromName>(&NdrWString::new(name))
            .await
    }
}

/// An in-process server for `store` and a client bound to it.
pub fn loopback(
    store: Arc<DiskStore>,
    config: ChannelConfig,
) -> dcom::Result<(Arc<Dispatcher>, DiskClient<LocalChannel>)> {
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(disk_interface(store));
    let channel = LocalChannel::with_config(Arc::clone(&dispatcher), syntax(), config)?;
    let proxy = ObjectProxy::new(Arc::new(channel), Ipid::generate());
    Ok((dispatcher, DiskClient::new(proxy)))
}
