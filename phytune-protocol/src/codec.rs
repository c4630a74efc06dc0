/// Read and write implementations for the wire formats of `KR_TUNE`
use std::io::{self, Read, Write};

use crate::{
    error::{DecodeError, ParseError, ReadError},
    protocol::{EyeSamplePair, KrTuneOp, Lane, Namespace, ParameterSetting, Request, TunedParameter},
};

const ORDINAL_MASK: u32 = 0xff;
const LANE_SHIFT: u32 = 8;
const LANE_MASK: u32 = 0x7;
const AUTOCAL_SHIFT: u32 = 11;
const INITIAL_SHIFT: u32 = 16;
const CURRENT_SHIFT: u32 = 24;

const LANE_PREFIX: &str = "Lane";

/// Splits a buffer into little-endian words. A trailing partial word is ignored.
fn words(buf: &[u8]) -> impl Iterator<Item = u32> + '_ {
    buf.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

fn lane_field(word: u32) -> Lane {
    Lane(((word >> LANE_SHIFT) & LANE_MASK) as u8)
}

impl TunedParameter {
    /// Decodes a single parameter word as returned by a get request.
    ///
    /// If autocal is enabled, the value in effect is taken from the current value field.
    /// Otherwise, that field carries no meaning and the initial value is in effect.
    pub fn from_word(word: u32, namespace: Namespace) -> Result<TunedParameter, DecodeError> {
        let ordinal = (word & ORDINAL_MASK) as u8;
        let parameter = namespace
            .parameter(ordinal)
            .ok_or(DecodeError::UnknownParameter(ordinal))?;
        let autocal = (word >> AUTOCAL_SHIFT) & 1 == 1;
        let initial_value = (word >> INITIAL_SHIFT) as u8;
        let current_value = (word >> CURRENT_SHIFT) as u8;
        Ok(TunedParameter {
            lane: lane_field(word),
            parameter,
            autocal,
            value: if autocal { current_value } else { initial_value },
            initial_value,
        })
    }
}

impl ParameterSetting {
    /// Encodes the setting into the word sent with a set request.
    pub fn to_word(&self) -> u32 {
        u32::from(self.parameter.ordinal())
            | u32::from(self.lane.index()) << LANE_SHIFT
            | u32::from(self.autocal) << AUTOCAL_SHIFT
            | u32::from(self.value) << INITIAL_SHIFT
    }

    /// Decodes the word of a set request. Fails if the ordinal is unknown in `namespace`.
    pub fn from_word(word: u32, namespace: Namespace) -> Option<ParameterSetting> {
        let parameter = namespace.parameter((word & ORDINAL_MASK) as u8)?;
        Some(ParameterSetting {
            lane: lane_field(word),
            parameter,
            value: (word >> INITIAL_SHIFT) as u8,
            autocal: (word >> AUTOCAL_SHIFT) & 1 == 1,
        })
    }

    /// Parses a setting of the form `Lane<0-4>.<ParameterName>=<value>[+]`.
    ///
    /// The value may be given in decimal, hexadecimal (`0x` prefix) or octal (`0` prefix).
    /// A trailing `+` enables autocal.
    ///
    /// ```
    /// use phytune_protocol::{Namespace, ParameterSetting};
    ///
    /// let setting = ParameterSetting::parse("Lane2.DFE_Tap1=0xc+", Namespace::RxEq).unwrap();
    /// assert_eq!(setting.lane.index(), 2);
    /// assert_eq!(setting.parameter.name(), "DFE_Tap1");
    /// assert_eq!(setting.value, 12);
    /// assert!(setting.autocal);
    /// ```
    pub fn parse(text: &str, namespace: Namespace) -> Result<ParameterSetting, ParseError> {
        let rest = text
            .strip_prefix(LANE_PREFIX)
            .ok_or(ParseError::MissingLanePrefix)?;

        let lane = match rest.as_bytes().first() {
            Some(digit @ b'0'..=b'4') => Lane(digit - b'0'),
            _ => {
                return Err(ParseError::InvalidLane(
                    rest.chars().next().map(String::from).unwrap_or_default(),
                ));
            }
        };

        let rest = rest[1..]
            .strip_prefix('.')
            .ok_or(ParseError::MissingSeparator)?;
        let (name, value_text) = rest.split_once('=').ok_or(ParseError::MissingValue)?;

        let (value, rest) = split_integer(value_text)?;
        let autocal = match rest {
            "" => false,
            "+" => true,
            _ => return Err(ParseError::TrailingCharacters(rest.to_owned())),
        };
        let value = u8::try_from(value).map_err(|_| ParseError::ValueOutOfRange(value))?;

        let parameter = namespace
            .lookup(name)
            .ok_or_else(|| ParseError::UnknownParameter {
                namespace,
                name: name.to_owned(),
            })?;

        Ok(ParameterSetting {
            lane,
            parameter,
            value,
            autocal,
        })
    }
}

/// Parses an unsigned integer at the start of `text`, detecting the base from its prefix.
/// Returns the value and the unparsed remainder.
fn split_integer(text: &str) -> Result<(u64, &str), ParseError> {
    if text.is_empty() {
        return Err(ParseError::MissingValue);
    }

    let (radix, body) = if let Some(hex) = text.strip_prefix("0x").or(text.strip_prefix("0X")) {
        if hex.starts_with(|c: char| c.is_ascii_hexdigit()) {
            (16, hex)
        } else {
            // Only the leading zero is a number, the 'x' is left over
            return Ok((0, &text[1..]));
        }
    } else if let Some(octal) = text.strip_prefix('0') {
        (8, octal)
    } else {
        (10, text)
    };

    let end = body
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(body.len());
    let (digits, rest) = body.split_at(end);

    if digits.is_empty() {
        return match radix {
            8 => Ok((0, rest)),
            _ => Err(ParseError::InvalidValue(text.to_owned())),
        };
    }

    let value = u64::from_str_radix(digits, radix)
        .map_err(|_| ParseError::InvalidValue(text.to_owned()))?;
    Ok((value, rest))
}

/// Decodes the response to a parameter get request.
///
/// Each entry is decoded on its own; unknown parameters are reported in place
/// and do not affect the remaining entries.
pub fn decode_parameters(
    buf: &[u8],
    namespace: Namespace,
) -> Vec<Result<TunedParameter, DecodeError>> {
    words(buf)
        .map(|word| TunedParameter::from_word(word, namespace))
        .collect()
}

/// Decodes the response to an eye-plot poll. Every word carries two samples.
pub fn decode_eye_samples(buf: &[u8]) -> Vec<EyeSamplePair> {
    words(buf)
        .map(|word| EyeSamplePair {
            low: (word & 0xffff) as u16,
            high: (word >> 16) as u16,
        })
        .collect()
}

/// Extracts the lane field of the first entry of a receive equalization get response.
///
/// The controller lists the active lane first. There is no request that reports the lane
/// being used directly, so this relies on the firmware's ordering of entries.
pub fn first_lane(buf: &[u8]) -> Option<Lane> {
    words(buf).next().map(lane_field)
}

impl Request {
    /// Serializes the request into its payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = self.op().tag().to_le_bytes().to_vec();
        match self {
            Request::SetRxEq(setting) | Request::SetTxEq(setting) => {
                payload.extend_from_slice(&setting.to_word().to_le_bytes())
            }
            Request::StartEyeScan { lane } => {
                payload.extend_from_slice(&u32::from(lane.index()).to_le_bytes())
            }
            Request::GetRxEq | Request::GetTxEq | Request::Recalibrate | Request::PollEyeScan => {}
        }
        payload
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    pub fn from_reader(reader: &mut impl Read) -> Result<Request, ReadError> {
        let tag = read_word(reader)?;
        let op = KrTuneOp::from_tag(tag).ok_or(ReadError::InvalidSubCommand(tag))?;
        Ok(match op {
            KrTuneOp::RxEqGet => Request::GetRxEq,
            KrTuneOp::TxEqGet => Request::GetTxEq,
            KrTuneOp::RxEqSet => Request::SetRxEq(read_setting(reader, Namespace::RxEq)?),
            KrTuneOp::TxEqSet => Request::SetTxEq(read_setting(reader, Namespace::TxEq)?),
            KrTuneOp::Recal => Request::Recalibrate,
            KrTuneOp::StartEyePlot => {
                let word = read_word(reader)?;
                let lane = u8::try_from(word)
                    .ok()
                    .and_then(Lane::new)
                    .ok_or(ReadError::InvalidLane(word))?;
                Request::StartEyeScan { lane }
            }
            KrTuneOp::PollEyePlot => Request::PollEyeScan,
        })
    }
}

fn read_word(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_setting(reader: &mut impl Read, namespace: Namespace) -> Result<ParameterSetting, ReadError> {
    let word = read_word(reader)?;
    ParameterSetting::from_word(word, namespace).ok_or(ReadError::InvalidParameterWord(word))
}

#[cfg(test)]
mod test {
    use crate::error::{DecodeError, ParseError, ReadError};
    use crate::protocol::{Lane, Namespace, ParameterSetting, Request, TunedParameter};
    use std::io::Cursor;

    fn setting(lane: u8, name: &str, value: u8, autocal: bool, ns: Namespace) -> ParameterSetting {
        ParameterSetting {
            lane: Lane::new(lane).unwrap(),
            parameter: ns.lookup(name).unwrap(),
            value,
            autocal,
        }
    }

    #[test]
    fn encode_word_layout() {
        let word = setting(3, "DFE_Tap2", 0xab, true, Namespace::RxEq).to_word();
        assert_eq!(word, 0x00ab_0b03);
    }

    #[test]
    fn decode_without_autocal_uses_initial_value() {
        // current field is garbage when autocal is off
        let param = TunedParameter::from_word(0x7f20_0201, Namespace::TxEq).unwrap();
        assert_eq!(param.lane.index(), 2);
        assert_eq!(param.parameter.name(), "Deemphasis_Tap1");
        assert!(!param.autocal);
        assert_eq!(param.value, 0x20);
        assert_eq!(param.initial_value, 0x20);
        assert_eq!(param.to_string(), "Lane2.Deemphasis_Tap1=32");
    }

    #[test]
    fn decode_with_autocal_reports_both_values() {
        let param = TunedParameter::from_word(0x1e0a_0800, Namespace::RxEq).unwrap();
        assert!(param.autocal);
        assert_eq!(param.value, 30);
        assert_eq!(param.initial_value, 10);
        assert_eq!(param.to_string(), "Lane0.Attenuation=30 (initial=10)");
    }

    #[test]
    fn round_trip_all_parameters() {
        for ns in [Namespace::RxEq, Namespace::TxEq] {
            for name in ns.names() {
                for lane in 0..=Lane::MAX_TUNABLE {
                    for value in 0..=u8::MAX {
                        for autocal in [false, true] {
                            let set = setting(lane, name, value, autocal, ns);
                            let read = TunedParameter::from_word(set.to_word(), ns).unwrap();
                            assert_eq!(read.lane, set.lane);
                            assert_eq!(read.parameter, set.parameter);
                            assert_eq!(read.autocal, autocal);
                            assert_eq!(read.initial_value, value);
                            if !autocal {
                                assert_eq!(read.value, value);
                            }
                            assert_eq!(ParameterSetting::from_word(set.to_word(), ns), Some(set));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn ordinal_boundary() {
        assert_eq!(
            TunedParameter::from_word(8, Namespace::RxEq),
            Err(DecodeError::UnknownParameter(8))
        );
        assert_eq!(
            TunedParameter::from_word(7, Namespace::RxEq)
                .unwrap()
                .parameter
                .name(),
            "DFE_Gain"
        );
        assert_eq!(
            TunedParameter::from_word(10, Namespace::TxEq),
            Err(DecodeError::UnknownParameter(10))
        );
        assert_eq!(
            TunedParameter::from_word(9, Namespace::TxEq)
                .unwrap()
                .parameter
                .name(),
            "Termination"
        );
    }

    #[test]
    fn unknown_entries_do_not_abort_decoding() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x0005_0102u32.to_le_bytes());
        buf.extend_from_slice(&0x0000_00ffu32.to_le_bytes());
        let decoded = super::decode_parameters(&buf, Namespace::RxEq);
        assert_eq!(decoded.len(), 2);
        let first = decoded[0].unwrap();
        assert_eq!(first.to_string(), "Lane1.DFE_Tap1=5");
        assert_eq!(decoded[1], Err(DecodeError::UnknownParameter(255)));
        assert_eq!(decoded[1].unwrap_err().to_string(), "unknown parameter 255");
    }

    #[test]
    fn partial_trailing_word_is_ignored() {
        let buf = [0x00, 0x00, 0x05, 0x00, 0xaa, 0xbb];
        assert_eq!(super::decode_parameters(&buf, Namespace::RxEq).len(), 1);
        assert_eq!(super::decode_eye_samples(&buf).len(), 1);
    }

    #[test]
    fn eye_samples_split_words() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x0002_0001u32.to_le_bytes());
        buf.extend_from_slice(&0xffff_0000u32.to_le_bytes());
        let samples = super::decode_eye_samples(&buf);
        assert_eq!(samples.len(), 2);
        assert_eq!((samples[0].low, samples[0].high), (1, 2));
        assert_eq!((samples[1].low, samples[1].high), (0, 0xffff));
        assert_eq!(samples[0].to_string(), "1 2");
    }

    #[test]
    fn first_lane_reads_first_entry() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x0000_0300u32.to_le_bytes());
        buf.extend_from_slice(&0x0000_0100u32.to_le_bytes());
        assert_eq!(super::first_lane(&buf), Lane::new(3));
        assert_eq!(super::first_lane(&[]), None);
    }

    #[test]
    fn parse_autocal() {
        let parsed = ParameterSetting::parse("Lane2.DFE_Tap1=12+", Namespace::RxEq).unwrap();
        assert_eq!(parsed, setting(2, "DFE_Tap1", 12, true, Namespace::RxEq));
    }

    #[test]
    fn parse_radix() {
        let value = |text: &str| {
            ParameterSetting::parse(&format!("Lane0.Amplitude={}", text), Namespace::TxEq)
                .map(|s| s.value)
        };
        assert_eq!(value("10"), Ok(10));
        assert_eq!(value("0x1F"), Ok(31));
        assert_eq!(value("0X1f"), Ok(31));
        assert_eq!(value("017"), Ok(15));
        assert_eq!(value("0"), Ok(0));
        assert_eq!(value("255"), Ok(255));
    }

    #[test]
    fn parse_rejections() {
        let parse = |text: &str| ParameterSetting::parse(text, Namespace::RxEq);
        assert_eq!(
            parse("Lane5.Attenuation=10"),
            Err(ParseError::InvalidLane("5".to_owned()))
        );
        assert_eq!(
            parse("Lane1.NotAReal=5"),
            Err(ParseError::UnknownParameter {
                namespace: Namespace::RxEq,
                name: "NotAReal".to_owned()
            })
        );
        assert_eq!(
            parse("Lane1.Attenuation=5x"),
            Err(ParseError::TrailingCharacters("x".to_owned()))
        );
        assert_eq!(
            parse("Lane1.Attenuation=5++"),
            Err(ParseError::TrailingCharacters("++".to_owned()))
        );
        assert_eq!(parse("lane1.Attenuation=5"), Err(ParseError::MissingLanePrefix));
        assert_eq!(parse("Lane1Attenuation=5"), Err(ParseError::MissingSeparator));
        assert_eq!(parse("Lane1.Attenuation"), Err(ParseError::MissingValue));
        assert_eq!(parse("Lane1.Attenuation="), Err(ParseError::MissingValue));
        assert_eq!(parse("Lane1.Attenuation=256"), Err(ParseError::ValueOutOfRange(256)));
        assert_eq!(
            parse("Lane1.Attenuation=abc"),
            Err(ParseError::InvalidValue("abc".to_owned()))
        );
        assert_eq!(
            parse("Lane1.Attenuation=0x"),
            Err(ParseError::TrailingCharacters("x".to_owned()))
        );
        assert_eq!(
            parse("Lane1.Attenuation=09"),
            Err(ParseError::TrailingCharacters("9".to_owned()))
        );
        // names are case sensitive and namespaces are separate
        assert!(parse("Lane1.attenuation=5").is_err());
        assert!(parse("Lane1.Amplitude=5").is_err());
    }

    #[test]
    fn write_requests() {
        let set = setting(1, "Slew_Rate", 4, false, Namespace::TxEq);
        let cases = [
            (Request::GetRxEq, vec![0u32]),
            (Request::SetRxEq(setting(0, "CTLE_Boost", 2, false, Namespace::RxEq)), vec![1, 0x0002_0001]),
            (Request::GetTxEq, vec![2]),
            (Request::SetTxEq(set), vec![3, set.to_word()]),
            (Request::Recalibrate, vec![4]),
            (Request::StartEyeScan { lane: Lane::new(3).unwrap() }, vec![5, 3]),
            (Request::PollEyeScan, vec![6]),
        ];
        for (request, words) in cases {
            let expected: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            let mut out = Vec::new();
            request.write_to(&mut out).unwrap();
            assert_eq!(out, expected, "{:?}", request);
            let mut cursor = Cursor::new(out);
            assert_eq!(Request::from_reader(&mut cursor).unwrap(), request);
        }
    }

    #[test]
    fn read_invalid_requests() {
        let mut cursor = Cursor::new(9u32.to_le_bytes().to_vec());
        match Request::from_reader(&mut cursor) {
            Err(ReadError::InvalidSubCommand(9)) => {}
            other => panic!("expected InvalidSubCommand, got {:?}", other),
        }

        let mut data = 5u32.to_le_bytes().to_vec();
        data.extend_from_slice(&8u32.to_le_bytes());
        match Request::from_reader(&mut Cursor::new(data)) {
            Err(ReadError::InvalidLane(8)) => {}
            other => panic!("expected InvalidLane, got {:?}", other),
        }

        let mut data = 1u32.to_le_bytes().to_vec();
        data.extend_from_slice(&0x0000_0020u32.to_le_bytes());
        match Request::from_reader(&mut Cursor::new(data)) {
            Err(ReadError::InvalidParameterWord(0x20)) => {}
            other => panic!("expected InvalidParameterWord, got {:?}", other),
        }

        // set request without its parameter word
        match Request::from_reader(&mut Cursor::new(3u32.to_le_bytes().to_vec())) {
            Err(ReadError::IoError(_)) => {}
            other => panic!("expected IoError, got {:?}", other),
        }
    }
}
