use ae_bridge::{Bridge, BridgeConfig};
use napi::bindgen_prelude::*;
use napi_derive::napi;

use crate::error::IntoNapiResult;

/// Bridge configuration from JavaScript
#[napi(object)]
#[derive(Clone, Default)]
pub struct BridgeConfigJs {
    /// Lists and records nested deeper than this arrive as `null`
    pub max_parse_depth: Option<u32>,
    /// Error number replied when a handler throws without a numeric `code`
    pub failure_error_code: Option<i32>,
}

impl BridgeConfigJs {
    pub fn into_rust(self) -> BridgeConfig {
        let mut builder = BridgeConfig::builder();

        if let Some(depth) = self.max_parse_depth {
            builder = builder.max_parse_depth(depth as usize);
        }
        if let Some(code) = self.failure_error_code {
            builder = builder.failure_error_code(code);
        }

        builder.build()
    }
}

/// Configure the bridge
///
/// Must be called before `addHandler`, `setDispatch`, or any event delivery;
/// the bridge is otherwise created with defaults on first use.
#[napi]
pub fn configure(options: Option<BridgeConfigJs>) -> Result<()> {
    let config = options.unwrap_or_default().into_rust();
    Bridge::init_global(config).into_napi()?;
    Ok(())
}
