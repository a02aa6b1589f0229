pub mod entity;
pub mod fixture;
pub mod postgres;
pub mod store;

pub use entity::{CatalogEntity, EntityPatch};
pub use fixture::{Fixture, FixtureError};
pub use postgres::PgEntityStore;
pub use store::{EntityStore, MemoryStore, CATALOG_TABLE};
