//! WASM bindings for Rucdeck.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmDeck } from 'rucdeck';
//!
//! await init();
//!
//! const deck = new WasmDeck(deckText);
//! const tree = JSON.parse(deck.hierarchy("result"));
//! const written = deck.write(75);
//! ```

use std::collections::HashMap;

use wasm_bindgen::prelude::*;

use crate::error::DeckError;
use crate::model::{CompileOptions, CompiledDeck, HierarchyMode};
use crate::{compile_str, write_deck};

fn to_js(e: DeckError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

/// A compiled deck held on the Rust side.
#[wasm_bindgen]
pub struct WasmDeck {
    compiled: CompiledDeck,
}

#[wasm_bindgen]
impl WasmDeck {
    /// Compile deck text with default options.
    #[wasm_bindgen(constructor)]
    pub fn new(text: &str) -> Result<WasmDeck, JsValue> {
        Self::with_options(text, None, None, None)
    }

    /// Compile with override file text, a result depth cutoff and
    /// placeholder values given as `NAME=VALUE` lines.
    #[wasm_bindgen]
    pub fn with_options(
        text: &str,
        override_text: Option<String>,
        max_level: Option<usize>,
        placeholders: Option<String>,
    ) -> Result<WasmDeck, JsValue> {
        let parameter_overrides: HashMap<String, String> = placeholders
            .as_deref()
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        let options = CompileOptions {
            result_max_level: max_level,
            parameter_overrides,
            override_text,
            ..CompileOptions::default()
        };
        let compiled = compile_str(text, &options).map_err(to_js)?;
        Ok(WasmDeck { compiled })
    }

    /// JSON summary with the `"definition"` or `"result"` hierarchy.
    #[wasm_bindgen]
    pub fn hierarchy(&self, mode: &str) -> Result<String, JsValue> {
        let mode = match mode {
            "definition" => HierarchyMode::Definition,
            "result" => HierarchyMode::Result,
            other => {
                return Err(to_js(DeckError::WasmError {
                    message: format!("unknown hierarchy mode '{}'", other),
                }))
            }
        };
        serde_json::to_string(&self.compiled.summary(Some(mode))).map_err(|e| to_js(e.into()))
    }

    /// Deck text of the compiled deck.
    #[wasm_bindgen]
    pub fn write(&self, wrap_column: usize) -> Result<String, JsValue> {
        write_deck(&self.compiled, wrap_column).map(|t| t.deck).map_err(to_js)
    }

    /// Number of warnings raised while compiling.
    #[wasm_bindgen(getter)]
    pub fn warning_count(&self) -> usize {
        self.compiled.diagnostics.len()
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
