//! Client-side state modules.
//!
//! DESIGN
//! ======
//! `store` is the observer primitive everything else is built on.
//! `storage` abstracts the durable key-value backend, `persistent` glues the
//! two together behind an explicit activation step, and `session` is the
//! authenticated identity every transport reads from.

pub mod persistent;
pub mod session;
pub mod storage;
pub mod store;
