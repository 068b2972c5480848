use crate::utils::misc::Typename;

/// The wire protocol: LF-terminated ASCII lines, tokens separated by
/// runs of whitespace. Clients speak IAMAT and WHATSAT; peers deliver
/// AT lines through the same listener.

pub const RADIUS_MAX_KM: f64 = 50.0;
pub const RESULT_CAP_MAX: usize = 20;

#[derive(Debug, thiserror::Error, strum_macros::IntoStaticStr)]
pub enum Error {
    #[error("unknown command")]
    UnknownCommand,
    #[error("wrong number of fields")]
    BadArity,
    #[error("malformed coordinates")]
    BadCoords,
    #[error("malformed timestamp")]
    BadTimestamp,
    #[error("malformed time skew")]
    BadSkew,
    #[error("radius out of range")]
    BadRadius,
    #[error("result cap out of range")]
    BadResultCap,
}

impl Typename for Error {
    fn typename(&self) -> &'static str {
        self.into()
    }
}

/// A latitude/longitude pair in ISO 6709 concatenated form, e.g.
/// `+34.068930-118.445127`. The raw text is kept so the pair can be
/// re-emitted byte-exact.
#[derive(Debug, Clone, PartialEq)]
pub struct Coords {
    pub raw: String,
    pub lat: f64,
    pub lon: f64,
}

impl Coords {
    pub fn parse(s: &str) -> Result<Self, Error> {
        if !s.starts_with(['+', '-']) {
            return Err(Error::BadCoords);
        }
        // the longitude starts at the second sign character
        let split = s[1..].find(['+', '-']).map(|i| i + 1).ok_or(Error::BadCoords)?;
        let lat = parse_signed_decimal(&s[..split]).ok_or(Error::BadCoords)?;
        let lon = parse_signed_decimal(&s[split..]).ok_or(Error::BadCoords)?;
        Ok(Coords { raw: s.to_string(), lat, lon })
    }
}

/// A client-reported timestamp. `raw` preserves the full textual
/// precision as received; `secs` is the f64 view used for ordering and
/// `nanos` the integer-nanosecond view used for skew arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub raw: String,
    pub secs: f64,
    pub nanos: i128,
}

impl Stamp {
    pub fn parse(s: &str) -> Result<Self, Error> {
        let secs: f64 = s.parse().map_err(|_| Error::BadTimestamp)?;
        if !secs.is_finite() {
            return Err(Error::BadTimestamp);
        }
        // exponent forms fall back to the (lossier) f64 view
        let nanos = decimal_to_nanos(s).unwrap_or((secs * 1e9) as i128);
        Ok(Stamp { raw: s.to_string(), secs, nanos })
    }
}

/// The canonical wire form of a location record. `raw_line` is the AT
/// line exactly as first emitted (or received) and is reused verbatim
/// for client replies and peer propagation so the skew and timestamp
/// never get re-rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct AtRecord {
    pub origin_server: String,
    pub time_skew: String,
    pub client_id: String,
    pub coords: Coords,
    pub stamp: Stamp,
    pub raw_line: String,
}

impl AtRecord {
    /// Build a fresh record on IAMAT acceptance; renders the raw line once.
    pub fn compose(origin_server: &str, time_skew: String, client_id: &str, coords: Coords, stamp: Stamp) -> Self {
        let raw_line = format!("AT {} {} {} {} {}", origin_server, time_skew, client_id, coords.raw, stamp.raw);
        AtRecord {
            origin_server: origin_server.to_string(),
            time_skew,
            client_id: client_id.to_string(),
            coords,
            stamp,
            raw_line,
        }
    }

    fn parse_tokens(tokens: &[&str], line: &str) -> Result<Self, Error> {
        if tokens.len() != 6 {
            return Err(Error::BadArity);
        }
        let skew = tokens[2];
        if !skew.starts_with(['+', '-']) || !skew.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false) {
            return Err(Error::BadSkew);
        }
        Ok(AtRecord {
            origin_server: tokens[1].to_string(),
            time_skew: skew.to_string(),
            client_id: tokens[3].to_string(),
            coords: Coords::parse(tokens[4])?,
            stamp: Stamp::parse(tokens[5])?,
            raw_line: line.to_string(),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "AT {} {} {} {} {}",
            self.origin_server, self.time_skew, self.client_id, self.coords.raw, self.stamp.raw
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Iamat { client_id: String, coords: Coords, stamp: Stamp },
    Whatsat { client_id: String, radius_km: f64, max_results: usize },
    At(AtRecord),
}

impl Command {
    /// Parse one line (already stripped of its terminator). Any failure
    /// maps to the `? <line>` reply at the handler.
    pub fn parse(line: &str) -> Result<Command, Error> {
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        match tokens.first().copied() {
            Some("IAMAT") => {
                if tokens.len() != 4 {
                    return Err(Error::BadArity);
                }
                Ok(Command::Iamat {
                    client_id: tokens[1].to_string(),
                    coords: Coords::parse(tokens[2])?,
                    stamp: Stamp::parse(tokens[3])?,
                })
            }
            Some("WHATSAT") => {
                if tokens.len() != 4 {
                    return Err(Error::BadArity);
                }
                let radius_km: f64 = tokens[2].parse().map_err(|_| Error::BadRadius)?;
                if !(radius_km > 0.0 && radius_km <= RADIUS_MAX_KM) {
                    return Err(Error::BadRadius);
                }
                let max_results: usize = tokens[3].parse().map_err(|_| Error::BadResultCap)?;
                if !(1..=RESULT_CAP_MAX).contains(&max_results) {
                    return Err(Error::BadResultCap);
                }
                Ok(Command::Whatsat { client_id: tokens[1].to_string(), radius_km, max_results })
            }
            Some("AT") => Ok(Command::At(AtRecord::parse_tokens(&tokens, line)?)),
            _ => Err(Error::UnknownCommand),
        }
    }
}

fn parse_signed_decimal(s: &str) -> Option<f64> {
    let rest = s.strip_prefix(['+', '-'])?;
    if rest.is_empty() || rest == "." {
        return None;
    }
    if !rest.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    if rest.bytes().filter(|&b| b == b'.').count() > 1 {
        return None;
    }
    let v: f64 = s.parse().ok()?;
    v.is_finite().then_some(v)
}

/// Exact nanosecond view of a plain decimal string. Fractional digits
/// beyond the ninth are truncated; the raw text stays authoritative on
/// the wire.
pub fn decimal_to_nanos(s: &str) -> Option<i128> {
    let (sign, body) = match s.strip_prefix('-') {
        Some(b) => (-1i128, b),
        None => (1i128, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac = [b'0'; 9];
    for (i, b) in frac_part.bytes().take(9).enumerate() {
        frac[i] = b;
    }
    // frac holds only ASCII digits at this point
    let frac_ns: i128 = std::str::from_utf8(&frac).ok()?.parse().ok()?;
    Some(sign * (secs.checked_mul(1_000_000_000)? + frac_ns))
}

/// Render a nanosecond delta as a signed decimal with nine fractional
/// digits, e.g. `+0.263873386`.
pub fn render_skew(delta_nanos: i128) -> String {
    let sign = if delta_nanos < 0 { '-' } else { '+' };
    let abs = delta_nanos.unsigned_abs();
    format!("{}{}.{:09}", sign, abs / 1_000_000_000, abs % 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concatenated_coords() {
        let c = Coords::parse("+34.068930-118.445127").unwrap();
        assert_eq!(c.lat, 34.068930);
        assert_eq!(c.lon, -118.445127);
        assert_eq!(c.raw, "+34.068930-118.445127");

        let c = Coords::parse("-12.5+0.25").unwrap();
        assert_eq!(c.lat, -12.5);
        assert_eq!(c.lon, 0.25);
    }

    #[test]
    fn rejects_malformed_coords() {
        for bad in ["34.06-118.44", "+34.06", "+34..06-118.44", "+34.06-118.44x", "+-118.44", ""] {
            assert!(Coords::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn stamp_keeps_full_precision() {
        let s = Stamp::parse("1621464827.959498503").unwrap();
        assert_eq!(s.raw, "1621464827.959498503");
        assert_eq!(s.nanos, 1_621_464_827_959_498_503);
        let t = Stamp::parse("1621464827.959498504").unwrap();
        assert_ne!(s.nanos, t.nanos);
    }

    #[test]
    fn stamp_rejects_junk() {
        for bad in ["abc", "", "nan", "inf", "12.3.4"] {
            assert!(Stamp::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn skew_rendering_is_signed_with_nine_digits() {
        assert_eq!(render_skew(263_873_386), "+0.263873386");
        assert_eq!(render_skew(-1_500_000_000), "-1.500000000");
        assert_eq!(render_skew(0), "+0.000000000");
        assert_eq!(render_skew(42), "+0.000000042");
    }

    #[test]
    fn iamat_parses() {
        let cmd = Command::parse("IAMAT kiwi.cs.ucla.edu +34.068930-118.445127 1621464827.959498503").unwrap();
        match cmd {
            Command::Iamat { client_id, coords, stamp } => {
                assert_eq!(client_id, "kiwi.cs.ucla.edu");
                assert_eq!(coords.lat, 34.068930);
                assert_eq!(stamp.raw, "1621464827.959498503");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn whatsat_bounds() {
        assert!(Command::parse("WHATSAT kiwi 10 5").is_ok());
        assert!(Command::parse("WHATSAT kiwi 50 20").is_ok());
        assert!(Command::parse("WHATSAT kiwi 0 5").is_err());
        assert!(Command::parse("WHATSAT kiwi 50.001 5").is_err());
        assert!(Command::parse("WHATSAT kiwi 10 0").is_err());
        assert!(Command::parse("WHATSAT kiwi 10 21").is_err());
        assert!(Command::parse("WHATSAT kiwi ten 5").is_err());
        assert!(Command::parse("WHATSAT kiwi 10 5.5").is_err());
    }

    #[test]
    fn unknown_and_short_lines_fail() {
        assert!(Command::parse("FOO bar baz").is_err());
        assert!(Command::parse("IAMAT kiwi +1.0-2.0").is_err());
        assert!(Command::parse("AT Clark +0.1 kiwi +1.0-2.0").is_err());
    }

    #[test]
    fn at_round_trips() {
        let line = "AT Clark +0.263873386 kiwi.cs.ucla.edu +34.068930-118.445127 1621464827.959498503";
        let rec = match Command::parse(line).unwrap() {
            Command::At(rec) => rec,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(rec.render(), line);
        assert_eq!(rec.raw_line, line);
        let again = match Command::parse(&rec.render()).unwrap() {
            Command::At(rec) => rec,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(again, rec);
    }

    #[test]
    fn composed_record_matches_parsed_form() {
        let coords = Coords::parse("+34.068930-118.445127").unwrap();
        let stamp = Stamp::parse("1621464827.959498503").unwrap();
        let rec = AtRecord::compose("Clark", render_skew(263_873_386), "kiwi", coords, stamp);
        assert_eq!(rec.raw_line, "AT Clark +0.263873386 kiwi +34.068930-118.445127 1621464827.959498503");
        match Command::parse(&rec.raw_line).unwrap() {
            Command::At(parsed) => assert_eq!(parsed, rec),
            other => panic!("unexpected {:?}", other),
        }
    }
}
