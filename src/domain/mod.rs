// Domain layer: plain data and the ports for the two external stores.

pub mod model;
pub mod ports;
