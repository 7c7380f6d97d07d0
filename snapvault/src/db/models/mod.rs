pub mod images;
pub mod users;

pub use images::{ImageCreate, ImageRecord};
pub use users::{UserCreate, UserRecord};
