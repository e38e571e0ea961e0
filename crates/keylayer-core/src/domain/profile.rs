//! Per-device configuration: key mappings and layer keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::device::DeviceId;
use crate::domain::program::Macro;

/// Layer number.  Layer 0 is the base layer.
pub type LayerId = u8;

/// The layer every device starts on.
pub const BASE_LAYER: LayerId = 0;

/// How a layer key changes the active layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Active while the key is held.
    Hold,
    /// Each press flips the layer on or off.
    Toggle,
    /// Active for `duration_ms` after the press, unless another layer key
    /// preempts it first.
    Momentary { duration_ms: u64 },
    /// Each press steps through `layer`, then every entry of `then`, then
    /// back to base.
    Sequential { then: Vec<LayerId> },
}

/// A key that switches layers instead of running a macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerKey {
    /// Scan code of the trigger key.
    pub trigger: u8,
    pub layer: LayerId,
    pub activation: Activation,
    /// Higher wins when several layers are engaged at once.
    #[serde(default)]
    pub priority: i32,
}

/// What one key does on the base layer and on individual layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub actions: Macro,
    /// Per-layer overrides of `actions`.
    #[serde(default)]
    pub layer_actions: BTreeMap<LayerId, Macro>,
}

impl KeyMapping {
    pub fn new(actions: Macro) -> Self {
        Self {
            actions,
            ..Self::default()
        }
    }

    /// The macro to run on `layer`: its override if present, else the base
    /// list, else nothing.
    pub fn actions_for(&self, layer: LayerId) -> Option<&Macro> {
        if layer != BASE_LAYER {
            if let Some(overridden) = self.layer_actions.get(&layer) {
                return Some(overridden);
            }
        }
        (!self.actions.is_empty()).then_some(&self.actions)
    }
}

/// Everything KeyLayer stores for one physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_id: DeviceId,
    #[serde(default)]
    pub name: String,
    /// Inactive profiles ignore all input.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Mappings keyed by scan code.
    #[serde(default)]
    pub mappings: BTreeMap<u8, KeyMapping>,
    #[serde(default)]
    pub layer_keys: Vec<LayerKey>,
}

fn default_active() -> bool {
    true
}

impl DeviceProfile {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            name: device_id.to_string(),
            device_id,
            active: true,
            mappings: BTreeMap::new(),
            layer_keys: Vec::new(),
        }
    }

    /// Maps `scan_code` to `actions` on the base layer, keeping any overrides.
    pub fn map_key(&mut self, scan_code: u8, actions: Macro) -> &mut KeyMapping {
        let mapping = self.mappings.entry(scan_code).or_default();
        mapping.actions = actions;
        mapping
    }

    /// Registers (or replaces) the layer key for `key.trigger`.
    pub fn add_layer_key(&mut self, key: LayerKey) {
        self.layer_keys.retain(|k| k.trigger != key.trigger);
        self.layer_keys.push(key);
    }

    pub fn layer_key(&self, scan_code: u8) -> Option<&LayerKey> {
        self.layer_keys.iter().find(|k| k.trigger == scan_code)
    }

    /// Resolves the macro for a non-layer key on `layer`.
    pub fn resolve(&self, scan_code: u8, layer: LayerId) -> Option<&Macro> {
        self.mappings.get(&scan_code)?.actions_for(layer)
    }
}
