// Command-and-motion core for the Zobo remote vehicle
//
// Link events and command frames come in, duty/direction actuation goes out,
// and the motors are stopped whenever commands dry up or the link drops.

pub mod config;
pub mod delegate;
pub mod idle;
pub mod messages;
pub mod motor;
pub mod protocol;
pub mod runtime;
pub mod transport;
pub mod vehicle;
pub mod watchdog;
