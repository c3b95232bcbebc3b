// ifmeter-snmp: Minimal async SNMPv2c client (BER codec, GET/GETNEXT, column table walks)

pub mod client;
pub mod codec;
pub mod error;
pub mod oid;
pub mod table;
pub mod target;
pub mod value;

pub use client::{SnmpClient, SnmpTransport};
pub use error::Error;
pub use oid::Oid;
pub use table::TableRow;
pub use target::Target;
pub use value::{Value, VarBind};
