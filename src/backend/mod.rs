//! Storage-backend interface: the uniform contract an RPC layer drives.

pub mod postgres;

use crate::errors::StoreResult;
use crate::model::{
    Extents, GetExtentsRequest, GetObsRequest, GetTsAttrGroupsRequest, Metadata2, Observation,
    TsMdataGroup,
};
use async_trait::async_trait;

pub use postgres::PostgresBackend;

/// The operations an RPC layer (out of scope here) would drive. Every method takes
/// `&self`; backends are expected to hold an internally-synchronized connection
/// pool and any other shared state behind interior mutability, the way
/// [`PostgresBackend`] does.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put_observations(&self, observations: Vec<Observation>) -> StoreResult<()>;

    async fn get_observations(&self, request: GetObsRequest) -> StoreResult<Vec<Metadata2>>;

    async fn get_ts_attr_groups(
        &self,
        request: GetTsAttrGroupsRequest,
    ) -> StoreResult<Vec<TsMdataGroup>>;

    async fn get_extents(&self, request: GetExtentsRequest) -> StoreResult<Extents>;
}
