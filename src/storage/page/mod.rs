mod page;

pub use page::{max_length, Page, INT_SIZE, UTF16_UNIT_SIZE};
