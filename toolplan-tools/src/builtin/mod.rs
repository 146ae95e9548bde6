//! Built-in capabilities wrapping scanners, resolvers and lookup APIs.
//!
//! Every module exposes a `NAME` constant and a `register` function. All of
//! them honour `enabled = false` in their [`toolplan_primitives::CapabilitySettings`].

use std::net::IpAddr;

use crate::error::{ToolError, ToolResult};
use crate::registry::RegistryBuilder;

pub mod command;
pub mod dig;
pub mod exploit;
pub mod internetdb;
pub mod msf;
pub mod nmap;
pub mod shodan;
pub mod web_reader;

/// Registers every built-in capability in a fixed order.
pub fn register_all(builder: &mut RegistryBuilder) {
    command::register(builder);
    dig::register(builder);
    nmap::register(builder);
    msf::register(builder);
    exploit::register(builder);
    internetdb::register(builder);
    shodan::register(builder);
    web_reader::register(builder);
}

fn parse_ip(tool: &str, raw: &str) -> ToolResult<IpAddr> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|_| ToolError::argument(tool, format!("invalid IP address `{raw}`")))
}
