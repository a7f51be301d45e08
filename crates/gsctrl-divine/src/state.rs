//! Cached device state decoded from reports.
//!
//! The session owns one [`DeviceState`]. Each decoded [`Frame`] is applied
//! with [`DeviceState::apply`], which stores the new values and returns the
//! variables to publish together with the feedback groups whose backing
//! values actually changed.

use std::collections::BTreeMap;

use gsctrl_core::{Feedback, VariableValue, Variables};

use crate::channels;
use crate::codec::{Frame, InfoReport, MixReport, StatusReport};

/// One of the eight metered signals, in status-report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Input1,
    Input2,
    Input3,
    Input4,
    Input12,
    Input34,
    Input1234,
    Output,
}

impl Level {
    /// All levels, in the order they appear in a status report.
    pub const ALL: [Level; 8] = [
        Level::Input1,
        Level::Input2,
        Level::Input3,
        Level::Input4,
        Level::Input12,
        Level::Input34,
        Level::Input1234,
        Level::Output,
    ];

    /// Variable id this level is published under.
    pub fn variable(&self) -> &'static str {
        match self {
            Level::Input1 => "levelInput1",
            Level::Input2 => "levelInput2",
            Level::Input3 => "levelInput3",
            Level::Input4 => "levelInput4",
            Level::Input12 => "levelInput12",
            Level::Input34 => "levelInput34",
            Level::Input1234 => "levelInput1234",
            Level::Output => "levelOutput",
        }
    }
}

/// Front-panel indicators carried by the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indicator {
    PotPosition,
    Volume,
    Temperature,
}

/// Key of a change-tracked slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Level(Level),
    Indicator(Indicator),
}

/// Result of applying one frame to the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// Variables to publish. Empty when the frame carried nothing new.
    pub variables: Variables,
    /// Feedback groups to re-evaluate, in [`Feedback`] order.
    pub feedbacks: Vec<Feedback>,
}

/// Complete cached state of one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    /// Identity from the last info report.
    pub identity: Option<InfoReport>,
    /// Change-tracked level and indicator values.
    slots: BTreeMap<Slot, f64>,
    /// Last published mix selection.
    mix_select: Option<u8>,
}

impl DeviceState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in `slot`. Returns `true` if it differs from the
    /// stored value (or the slot was empty).
    pub fn update(&mut self, slot: Slot, value: f64) -> bool {
        self.slots.insert(slot, value) != Some(value)
    }

    /// Current value of a slot.
    pub fn get(&self, slot: Slot) -> Option<f64> {
        self.slots.get(&slot).copied()
    }

    /// Current level in dB.
    pub fn level(&self, level: Level) -> Option<f64> {
        self.get(Slot::Level(level))
    }

    /// Current indicator value. Volume is the raw 0-127 value.
    pub fn indicator(&self, indicator: Indicator) -> Option<f64> {
        self.get(Slot::Indicator(indicator))
    }

    /// Last mix selection seen.
    pub fn mix_select(&self) -> Option<u8> {
        self.mix_select
    }

    /// Record a mix selection. Returns `true` if it changed.
    pub fn update_mix(&mut self, mix_select: u8) -> bool {
        self.mix_select.replace(mix_select) != Some(mix_select)
    }

    /// Clear every slot, the mix-selection cache, and the identity.
    pub fn reset(&mut self) {
        self.identity = None;
        self.slots.clear();
        self.mix_select = None;
    }

    /// Apply a decoded frame.
    ///
    /// Config reports and unrecognized frames leave the state untouched and
    /// yield an empty update.
    pub fn apply(&mut self, frame: &Frame) -> StateUpdate {
        match frame {
            Frame::Info(info) => self.apply_info(info),
            Frame::Status(status) => self.apply_status(status),
            Frame::Divine(mix) => self.apply_mix(mix, false),
            Frame::Short(mix) | Frame::Composite(mix) => self.apply_mix(mix, true),
            Frame::Config(_) | Frame::Unrecognized => StateUpdate::default(),
        }
    }

    fn apply_info(&mut self, info: &InfoReport) -> StateUpdate {
        let mut variables = Variables::new();
        variables.insert("firmware", info.firmware.to_string().into());
        variables.insert("productId", info.product.to_string().into());
        variables.insert("hostName", info.host_name.as_str().into());
        variables.insert("friendlyName", info.friendly_name.as_str().into());
        variables.insert("domainName", info.domain_name.as_str().into());
        self.identity = Some(info.clone());

        StateUpdate {
            variables,
            feedbacks: Vec::new(),
        }
    }

    fn apply_status(&mut self, status: &StatusReport) -> StateUpdate {
        let mut meters_changed = false;
        for (level, &db) in Level::ALL.iter().zip(&status.levels) {
            meters_changed |= self.update(Slot::Level(*level), db);
        }

        let mut indicators_changed = false;
        indicators_changed |= self.update(
            Slot::Indicator(Indicator::PotPosition),
            f64::from(status.pot_position),
        );
        indicators_changed |=
            self.update(Slot::Indicator(Indicator::Volume), f64::from(status.volume));
        indicators_changed |=
            self.update(Slot::Indicator(Indicator::Temperature), status.temperature);

        let mut variables = Variables::new();
        variables.insert("volume", status.volume.into());
        variables.insert(
            "volume_dB",
            match status.volume_db() {
                Some(db) => VariableValue::Number(db),
                None => VariableValue::from("-INF"),
            },
        );
        for (level, &db) in Level::ALL.iter().zip(&status.levels) {
            variables.insert(level.variable(), db.into());
        }
        variables.insert("potPosition", status.pot_position.into());
        variables.insert("temp", status.temperature.into());

        let mut feedbacks = Vec::new();
        if meters_changed {
            feedbacks.push(Feedback::Meter);
        }
        if indicators_changed {
            feedbacks.push(Feedback::Indicator);
        }

        StateUpdate {
            variables,
            feedbacks,
        }
    }

    /// Divine reports publish only on change. Short and composite reports
    /// publish every time but still refresh the cache.
    fn apply_mix(&mut self, mix: &MixReport, always: bool) -> StateUpdate {
        if !self.update_mix(mix.mix_select) && !always {
            return StateUpdate::default();
        }

        let mut variables = Variables::new();
        variables.insert("mixSelectValue", mix.mix_select.into());
        variables.insert("mixSelectLabel", channels::label(mix.mix_select).into());
        StateUpdate {
            variables,
            feedbacks: Vec::new(),
        }
    }
}
