//! Client side of ORPC calls
//!
//! An [`ObjectProxy`] stands for one interface pointer on a remote object.
//! Calls go out over any bound [`RpcChannel`] with the IPID as the object
//! UUID of the request PDU.

use std::sync::Arc;

use dcerpc::RpcChannel;
use tracing::{debug, trace};

use crate::envelope::{decode_response, encode_request, OrpcOperation, OrpcResponse};
use crate::types::{Cid, Ipid, OrpcThis, Result};

/// Proxy for a remote COM interface
pub struct ObjectProxy<C: RpcChannel + ?Sized> {
    channel: Arc<C>,
    ipid: Ipid,
    /// Causality id stamped on calls; fresh per call when unset
    causality: Option<Cid>,
}

impl<C: RpcChannel + ?Sized> Clone for ObjectProxy<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            ipid: self.ipid,
            causality: self.causality,
        }
    }
}

impl<C: RpcChannel + ?Sized> ObjectProxy<C> {
    pub fn new(channel: Arc<C>, ipid: Ipid) -> Self {
        Self {
            channel,
            ipid,
            causality: None,
        }
    }

    /// Stamp every call with `cid`, making them one call chain.
    pub fn with_causality(mut self, cid: Cid) -> Self {
        self.causality = Some(cid);
        self
    }

    /// Get the IPID
    pub fn ipid(&self) -> Ipid {
        self.ipid
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    fn orpc_this(&self) -> OrpcThis {
        match self.causality {
            Some(cid) => OrpcThis::with_causality(cid),
            None => OrpcThis::new(),
        }
    }

    /// Invoke `O` and return its out-parameters.
    ///
    /// A fault from the server surfaces as [`DcomError::Rpc`], a non-zero
    /// HRESULT as [`DcomError::CallFailed`]. Nothing is retried.
    ///
    /// [`DcomError::Rpc`]: crate::DcomError::Rpc
    /// [`DcomError::CallFailed`]: crate::DcomError::CallFailed
    pub async fn call<O: OrpcOperation>(&self, params: &O::In) -> Result<O::Out> {
        let response = self.call_with::<O>(&self.orpc_this(), params).await?;
        if !response.is_success() {
            debug!(
                "{} on {} failed: 0x{:08x}",
                O::NAME,
                self.ipid,
                response.status
            );
        }
        response.into_result(O::OPNUM)
    }

    /// Invoke `O` with an explicit ORPCTHIS and return the whole response.
    pub async fn call_with<O: OrpcOperation>(
        &self,
        this: &OrpcThis,
        params: &O::In,
    ) -> Result<OrpcResponse<O::Out>> {
        let ctx = self.channel.ndr_context();
        let stub_data = encode_request(ctx, this, params)?;
        trace!("Calling {} (opnum {}) on {}", O::NAME, O::OPNUM, self.ipid);
        let reply = self
            .channel
            .invoke(O::OPNUM, Some(*self.ipid.as_uuid()), stub_data)
            .await?;
        Ok(decode_response(ctx, &reply)?)
    }
}
