mod core;
mod ops;

pub use core::Collection;
pub use ops::{DeleteReceipt, InsertReceipt, Page, PageMeta, UpdateReceipt, UpdateReturnOptions};
