use std::fmt::Display;

/// MCDI command number of `KR_TUNE`. Every request of this crate is a sub-command of it.
pub const MC_CMD_KR_TUNE: u32 = 0x64;

/// Largest response the controller produces for a parameter get or an eye-plot poll.
pub const KR_TUNE_OUT_LEN_MAX: usize = 252;

const RXEQ_PARAMS: [&str; 8] = [
    "Attenuation",
    "CTLE_Boost",
    "DFE_Tap1",
    "DFE_Tap2",
    "DFE_Tap3",
    "DFE_Tap4",
    "DFE_Tap5",
    "DFE_Gain",
];

const TXEQ_PARAMS: [&str; 10] = [
    "Amplitude",
    "Deemphasis_Tap1",
    "Deemphasis_Tap1_Fine",
    "Deemphasis_Tap2",
    "Deemphasis_Tap2_Fine",
    "Preemphasis",
    "Preemphasis_Fine",
    "Slew_Rate",
    "Slew_Rate_Fine",
    "Termination",
];

/// The two independent parameter tables of the SERDES.
///
/// The position of a name inside its table is the ordinal sent on the wire,
/// so the tables must never be reordered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Namespace {
    /// Receive equalization
    RxEq,
    /// Transmit equalization
    TxEq,
}

impl Namespace {
    /// The ordered parameter names of this namespace.
    pub fn names(self) -> &'static [&'static str] {
        match self {
            Namespace::RxEq => &RXEQ_PARAMS,
            Namespace::TxEq => &TXEQ_PARAMS,
        }
    }

    /// Looks up a parameter by its exact, case-sensitive name.
    pub fn lookup(self, name: &str) -> Option<ParameterId> {
        self.names()
            .iter()
            .position(|candidate| *candidate == name)
            .map(|ordinal| ParameterId {
                namespace: self,
                ordinal: ordinal as u8,
            })
    }

    /// Returns the parameter with the given wire ordinal, if the table has one.
    pub fn parameter(self, ordinal: u8) -> Option<ParameterId> {
        if (ordinal as usize) < self.names().len() {
            Some(ParameterId {
                namespace: self,
                ordinal,
            })
        } else {
            None
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::RxEq => write!(f, "rxeq"),
            Namespace::TxEq => write!(f, "txeq"),
        }
    }
}

/// A named parameter. Can only be obtained through [Namespace::lookup] or
/// [Namespace::parameter], so the ordinal is always valid for its namespace.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ParameterId {
    namespace: Namespace,
    ordinal: u8,
}

impl ParameterId {
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// The index of the parameter in its namespace table
    pub fn ordinal(&self) -> u8 {
        self.ordinal
    }

    pub fn name(&self) -> &'static str {
        self.namespace.names()[self.ordinal as usize]
    }
}

/// A SERDES lane as carried in the 3-bit lane field of a parameter word.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Lane(pub(crate) u8);

impl Lane {
    /// Highest lane that can be addressed by a parameter setting.
    pub const MAX_TUNABLE: u8 = 4;
    /// Highest value representable in the wire field.
    pub const MAX_WIRE: u8 = 7;

    /// Creates a lane if `index` fits the wire field.
    pub fn new(index: u8) -> Option<Lane> {
        if index <= Self::MAX_WIRE {
            Some(Lane(index))
        } else {
            None
        }
    }

    pub fn index(&self) -> u8 {
        self.0
    }
}

impl Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parameter as reported by the controller.
///
/// The controller reports two values. `initial_value` is the value the parameter was set to,
/// `value` is the value in effect. When autocal is disabled both are the same.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TunedParameter {
    pub lane: Lane,
    pub parameter: ParameterId,
    pub autocal: bool,
    pub value: u8,
    pub initial_value: u8,
}

impl Display for TunedParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lane{}.{}={}",
            self.lane,
            self.parameter.name(),
            self.value
        )?;
        if self.autocal {
            write!(f, " (initial={})", self.initial_value)?;
        }
        Ok(())
    }
}

/// A parameter value to write to the controller.
/// In contrast to [TunedParameter] only a single value is transferred.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParameterSetting {
    pub lane: Lane,
    pub parameter: ParameterId,
    pub value: u8,
    /// Lets the controller calibrate the parameter, starting at `value`
    pub autocal: bool,
}

/// The two 16-bit halves of a word returned by an eye-plot poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct EyeSamplePair {
    pub low: u16,
    pub high: u16,
}

impl Display for EyeSamplePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.low, self.high)
    }
}

/// The `KR_TUNE` sub-command, transmitted as the first word of every request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum KrTuneOp {
    RxEqGet = 0,
    RxEqSet = 1,
    TxEqGet = 2,
    TxEqSet = 3,
    Recal = 4,
    StartEyePlot = 5,
    PollEyePlot = 6,
}

impl KrTuneOp {
    pub fn from_tag(tag: u32) -> Option<KrTuneOp> {
        Some(match tag {
            0 => KrTuneOp::RxEqGet,
            1 => KrTuneOp::RxEqSet,
            2 => KrTuneOp::TxEqGet,
            3 => KrTuneOp::TxEqSet,
            4 => KrTuneOp::Recal,
            5 => KrTuneOp::StartEyePlot,
            6 => KrTuneOp::PollEyePlot,
            _ => return None,
        })
    }

    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl Display for KrTuneOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KrTuneOp::RxEqGet => "MC_CMD_KR_TUNE_IN_RXEQ_GET",
            KrTuneOp::RxEqSet => "MC_CMD_KR_TUNE_IN_RXEQ_SET",
            KrTuneOp::TxEqGet => "MC_CMD_KR_TUNE_IN_TXEQ_GET",
            KrTuneOp::TxEqSet => "MC_CMD_KR_TUNE_IN_TXEQ_SET",
            KrTuneOp::Recal => "MC_CMD_KR_TUNE_IN_RECAL",
            KrTuneOp::StartEyePlot => "MC_CMD_KR_TUNE_IN_START_EYE_PLOT",
            KrTuneOp::PollEyePlot => "MC_CMD_KR_TUNE_IN_POLL_EYE_PLOT",
        };
        write!(f, "{}", name)
    }
}

/// A `KR_TUNE` request sent to the management controller.
/// Each request is answered by exactly one response; see [Request::response_len_max]
/// for the size the caller must offer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Request {
    /// Reads all receive equalization parameters of all lanes.
    GetRxEq,
    SetRxEq(ParameterSetting),
    /// Reads all transmit equalization parameters of all lanes.
    GetTxEq,
    SetTxEq(ParameterSetting),
    /// Restarts calibration of all parameters that have autocal enabled.
    Recalibrate,
    /// Starts acquisition of an eye diagram on a single lane.
    StartEyeScan { lane: Lane },
    /// Fetches the next batch of eye diagram samples. An empty response ends the acquisition.
    PollEyeScan,
}

impl Request {
    pub fn op(&self) -> KrTuneOp {
        match self {
            Request::GetRxEq => KrTuneOp::RxEqGet,
            Request::SetRxEq(_) => KrTuneOp::RxEqSet,
            Request::GetTxEq => KrTuneOp::TxEqGet,
            Request::SetTxEq(_) => KrTuneOp::TxEqSet,
            Request::Recalibrate => KrTuneOp::Recal,
            Request::StartEyeScan { .. } => KrTuneOp::StartEyePlot,
            Request::PollEyeScan => KrTuneOp::PollEyePlot,
        }
    }

    /// The number of response bytes the controller may return for this request.
    pub fn response_len_max(&self) -> usize {
        match self {
            Request::GetRxEq | Request::GetTxEq | Request::PollEyeScan => KR_TUNE_OUT_LEN_MAX,
            _ => 0,
        }
    }
}
