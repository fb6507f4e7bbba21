// src/message/mod.rs

//! Message buffers: the move-only engine `Msg` and the shareable user-facing `Message`.

mod flags;
mod msg;
mod owned;

pub(crate) use flags::OpFlags;
pub(crate) use msg::Msg;
pub use owned::Message;
