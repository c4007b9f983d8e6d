//! Domain logic, free of any transport

pub mod communication;
