//! Disk service implementation

use std::sync::Arc;

use dcerpc::{Interface, InterfaceBuilder, SyntaxId, Uuid};
use dcom::{hresult, OrpcCall, OrpcInterfaceExt, Reply};
use midl_ndr::{FullPtr, NdrWString, UniquePtr};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::types::{
    status, DiskInfo, DiskList, DiskSignature, GetDiskIdFromName, ObjectId, PackInfo, QueryDisks,
    UninstallDisks, UninstallDisksIn, UninstallDisksOut, DISK_SERVICE_UUID, DISK_SERVICE_VERSION,
};

/// In-memory disk inventory
#[derive(Default)]
pub struct DiskStore {
    disks: RwLock<Vec<DiskInfo>>,
}

impl DiskStore {
    pub fn new(disks: Vec<DiskInfo>) -> Self {
        Self {
            disks: RwLock::new(disks),
        }
    }

    /// Four disks: two in an online pack, one in an offline pack, one GPT
    /// disk outside any pack.
    pub fn sample() -> Self {
        let online = FullPtr::new(PackInfo::new(object_id(0x100), "data-pool", true));
        let offline = FullPtr::new(PackInfo::new(object_id(0x200), "archive", false));
        let disk = |n: u32, size_gib: u64, signature: DiskSignature, pack: &FullPtr<PackInfo>| DiskInfo {
            id: object_id(n),
            size: size_gib << 30,
            signature,
            friendly_name: UniquePtr::new(NdrWString::new(format!("Disk {}", n))),
            pack: pack.clone(),
        };
        Self::new(vec![
            disk(1, 512, DiskSignature::Mbr(0x5EED_0001), &online),
            disk(2, 512, DiskSignature::Mbr(0x5EED_0002), &online),
            disk(3, 2048, DiskSignature::Mbr(0x5EED_0003), &offline),
            disk(4, 256, DiskSignature::Gpt(object_id(0xD15C)), &FullPtr::null()),
        ])
    }

    pub fn len(&self) -> usize {
        self.disks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.disks.read().is_empty()
    }

    pub fn query(&self, max: u32) -> Vec<DiskInfo> {
        let disks = self.disks.read();
        let take = if max == 0 { disks.len() } else { max as usize };
        disks.iter().take(take).cloned().collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.disks
            .read()
            .iter()
            .find(|disk| disk.name() == Some(name))
            .map(|disk| disk.id)
    }

    /// Remove each requested disk. Returns one status per id and whether a
    /// reboot is needed to finish.
    pub fn uninstall(&self, ids: &[ObjectId], force: bool) -> (Vec<u32>, bool) {
        let mut disks = self.disks.write();
        let mut reboot = false;
        let results = ids
            .iter()
            .map(|id| {
                let Some(index) = disks.iter().position(|disk| &disk.id == id) else {
                    return status::VDS_E_OBJECT_NOT_FOUND;
                };
                let pack_online = disks[index].pack.get().map_or(false, |pack| pack.online);
                if pack_online && !force {
                    return status::VDS_E_PACK_ONLINE;
                }
                reboot |= pack_online;
                disks.remove(index);
                hresult::S_OK
            })
            .collect();
        (results, reboot)
    }
}

fn object_id(n: u32) -> ObjectId {
    Uuid {
        data1: n,
        data2: 0x0d15,
        data3: 0x4c00,
        data4: [0x80, 0, 0, 0, 0, 0, 0, 0x01],
    }
}

pub fn syntax() -> SyntaxId {
    let uuid = Uuid::parse(DISK_SERVICE_UUID).unwrap_or(Uuid::NIL);
    SyntaxId::new(uuid, DISK_SERVICE_VERSION, 0)
}

/// Build the disk service interface over `store`.
pub fn disk_interface(store: Arc<DiskStore>) -> Interface {
    let query_store = Arc::clone(&store);
    let uninstall_store = Arc::clone(&store);
    let lookup_store = store;

    InterfaceBuilder::from_syntax(syntax())
        .orpc::<QueryDisks, _, _>(move |_call: OrpcCall, max: u32| {
            let disks = query_store.query(max);
            async move {
                debug!("QueryDisks: returning {} disks", disks.len());
                Reply::ok(DiskList::new(disks))
            }
        })
        .orpc::<UninstallDisks, _, _>(move |call: OrpcCall, request: UninstallDisksIn| {
            let store = Arc::clone(&uninstall_store);
            async move {
                if request.count == 0 {
                    return Reply::failed(hresult::E_INVALIDARG);
                }
                let ids: Vec<ObjectId> = request
                    .disk_ids
                    .iter()
                    .take(request.count as usize)
                    .copied()
                    .collect();
                let (results, reboot) = store.uninstall(&ids, request.force);
                info!(
                    "UninstallDisks: {} requested, cid {}, {} remaining",
                    ids.len(),
                    call.this.cid,
                    store.len()
                );
                Reply::ok(UninstallDisksOut { reboot, results })
            }
        })
        .orpc::<GetDiskIdFromName, _, _>(move |_call: OrpcCall, name: NdrWString| {
            let found = lookup_store.find_by_name(name.as_str());
            async move {
                match found {
                    Some(id) => Reply::ok(id),
                    None => Reply::failed(status::VDS_E_OBJECT_NOT_FOUND),
                }
            }
        })
        .build()
}
