//! Per-device layer state.
//!
//! Each device has a set of *engaged* layers (held, toggled on, momentarily
//! active …).  The active layer is the engaged layer with the highest
//! priority; equal priorities go to the most recent activation.  With nothing
//! engaged the device is on [`BASE_LAYER`].
//!
//! The state machine is pure: timers for momentary layers are the caller's
//! job.  A momentary activation returns a [`MomentaryTimer`]; when it fires
//! the caller passes its ticket to [`LayerStateMachine::expire`], which is a
//! no-op if the activation was preempted in the meantime.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::domain::device::DeviceId;
use crate::domain::profile::{Activation, LayerId, LayerKey, BASE_LAYER};

/// Revert timer requested by a momentary activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MomentaryTimer {
    pub ticket: u64,
    pub duration: Duration,
}

/// Result of feeding one event into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerChange {
    pub from: LayerId,
    pub to: LayerId,
    /// Set when the caller must schedule a revert.
    pub momentary: Option<MomentaryTimer>,
}

impl LayerChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone)]
enum EngagementKind {
    Hold,
    Toggle,
    Momentary { ticket: u64, expires_at: Instant },
    Sequential { step: usize },
}

#[derive(Debug, Clone)]
struct Engagement {
    trigger: u8,
    layer: LayerId,
    priority: i32,
    /// Activation order; larger is more recent.
    sequence: u64,
    kind: EngagementKind,
}

#[derive(Debug, Default)]
struct DeviceLayers {
    engaged: Vec<Engagement>,
    next_sequence: u64,
}

impl DeviceLayers {
    fn active(&self) -> LayerId {
        self.engaged
            .iter()
            .max_by_key(|e| (e.priority, e.sequence))
            .map_or(BASE_LAYER, |e| e.layer)
    }

    fn position(&self, trigger: u8) -> Option<usize> {
        self.engaged.iter().position(|e| e.trigger == trigger)
    }

    fn bump(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

/// Active-layer tracking for every device.
#[derive(Debug, Default)]
pub struct LayerStateMachine {
    devices: HashMap<DeviceId, DeviceLayers>,
    next_ticket: u64,
}

impl LayerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The device's active layer.
    pub fn active_layer(&self, device: &DeviceId) -> LayerId {
        self.devices.get(device).map_or(BASE_LAYER, DeviceLayers::active)
    }

    /// Applies a key-down of the layer key `key`.
    pub fn on_key_down(&mut self, device: &DeviceId, key: &LayerKey, now: Instant) -> LayerChange {
        let layers = self.devices.entry(device.clone()).or_default();
        let from = layers.active();

        // Any layer key preempts pending momentary layers, including a repeat
        // of the same momentary key, which restarts its timer.
        layers
            .engaged
            .retain(|e| !matches!(e.kind, EngagementKind::Momentary { .. }));

        let mut momentary = None;
        match &key.activation {
            Activation::Hold => {
                if layers.position(key.trigger).is_none() {
                    let sequence = layers.bump();
                    layers.engaged.push(Engagement {
                        trigger: key.trigger,
                        layer: key.layer,
                        priority: key.priority,
                        sequence,
                        kind: EngagementKind::Hold,
                    });
                }
            }
            Activation::Toggle => match layers.position(key.trigger) {
                Some(index) => {
                    layers.engaged.remove(index);
                }
                None => {
                    let sequence = layers.bump();
                    layers.engaged.push(Engagement {
                        trigger: key.trigger,
                        layer: key.layer,
                        priority: key.priority,
                        sequence,
                        kind: EngagementKind::Toggle,
                    });
                }
            },
            Activation::Momentary { duration_ms } => {
                self.next_ticket += 1;
                let ticket = self.next_ticket;
                let duration = Duration::from_millis(*duration_ms);
                let sequence = layers.bump();
                layers.engaged.push(Engagement {
                    trigger: key.trigger,
                    layer: key.layer,
                    priority: key.priority,
                    sequence,
                    kind: EngagementKind::Momentary {
                        ticket,
                        expires_at: now + duration,
                    },
                });
                momentary = Some(MomentaryTimer { ticket, duration });
            }
            Activation::Sequential { then } => {
                let current = layers.position(key.trigger).map(|index| {
                    let step = match layers.engaged[index].kind {
                        EngagementKind::Sequential { step } => Some(step),
                        _ => None,
                    };
                    layers.engaged.remove(index);
                    step
                });
                let next_step = match current {
                    Some(Some(step)) => Some(step + 1),
                    _ => Some(0),
                }
                .filter(|&step| step <= then.len());

                if let Some(step) = next_step {
                    let layer = if step == 0 { key.layer } else { then[step - 1] };
                    let sequence = layers.bump();
                    layers.engaged.push(Engagement {
                        trigger: key.trigger,
                        layer,
                        priority: key.priority,
                        sequence,
                        kind: EngagementKind::Sequential { step },
                    });
                }
            }
        }

        LayerChange {
            from,
            to: layers.active(),
            momentary,
        }
    }

    /// Applies a key-up of `trigger`.  Only hold layers react.
    pub fn on_key_up(&mut self, device: &DeviceId, trigger: u8) -> Option<LayerChange> {
        let layers = self.devices.get_mut(device)?;
        let index = layers
            .engaged
            .iter()
            .position(|e| e.trigger == trigger && matches!(e.kind, EngagementKind::Hold))?;
        let from = layers.active();
        layers.engaged.remove(index);
        Some(LayerChange {
            from,
            to: layers.active(),
            momentary: None,
        })
    }

    /// Ends the momentary activation identified by `ticket`, if still engaged.
    pub fn expire(&mut self, device: &DeviceId, ticket: u64) -> Option<LayerChange> {
        let change = self.remove_momentary(device, |t, _| t == ticket);
        if change.is_none() {
            tracing::trace!(%device, ticket, "momentary ticket already preempted");
        }
        change
    }

    /// Ends every momentary activation on `device` whose time is up.
    pub fn expire_due(&mut self, device: &DeviceId, now: Instant) -> Option<LayerChange> {
        self.remove_momentary(device, |_, expires_at| expires_at <= now)
    }

    /// Drops all engagements for `device`, returning it to base.
    pub fn reset(&mut self, device: &DeviceId) -> LayerId {
        let from = self.active_layer(device);
        self.devices.remove(device);
        from
    }

    fn remove_momentary<F>(&mut self, device: &DeviceId, mut matches: F) -> Option<LayerChange>
    where
        F: FnMut(u64, Instant) -> bool,
    {
        let layers = self.devices.get_mut(device)?;
        let from = layers.active();
        let before = layers.engaged.len();
        layers.engaged.retain(|e| match e.kind {
            EngagementKind::Momentary { ticket, expires_at } => !matches(ticket, expires_at),
            _ => true,
        });
        (layers.engaged.len() != before).then(|| LayerChange {
            from,
            to: layers.active(),
            momentary: None,
        })
    }
}
