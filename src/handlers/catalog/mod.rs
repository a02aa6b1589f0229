pub mod unarchive;

pub use unarchive::unarchive_products;
