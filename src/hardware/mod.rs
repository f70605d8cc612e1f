//! Hardware Abstractions
//!
//! Capability traits for the wireless link (`capabilities`) and simulated
//! implementations for tests and bench runs without units (`mock`).

pub mod capabilities;
pub mod mock;

pub use capabilities::{Advertisement, NotificationCallback, Scanner, Transport};
