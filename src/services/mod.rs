pub mod unarchive;

pub use unarchive::{UnarchiveError, UnarchiveInput, UnarchiveOptions, UnarchiveService};
