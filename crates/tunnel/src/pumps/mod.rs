//! Background pumps owned by a tunnel session.

mod keepalive;
mod write;

pub(crate) use keepalive::keepalive_pump;
pub(crate) use write::write_pump;
