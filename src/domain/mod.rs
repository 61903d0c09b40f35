//! Domain model: the service catalog, inbound tickets, and the per-ticket
//! classification lifecycle.

pub mod catalog;
pub mod classification;
pub mod ticket;
