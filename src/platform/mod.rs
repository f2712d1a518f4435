//! Native Apple Event Manager integration

#[cfg(target_os = "macos")]
pub mod macos;
