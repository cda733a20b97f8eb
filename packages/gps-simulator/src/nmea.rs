//! nmea.rs — NMEA 0183 sentence encoder
//!
//! Pure functions from a `Position` snapshot to framed sentences. Every
//! sentence leaves here as `$<body>*XX\r\n`.
//!
//! Locked:   GGA, RMC, GLL, VTG, GSA, GSV × ⌈n/4⌉, ZDA
//! Unlocked: GGA, RMC, GLL, VTG (no-fix variants only)

use chrono::{DateTime, Utc};
use gps_types::{Position, Satellite};

use crate::geo::KNOTS_TO_KMH;

/// Fixed dilution-of-precision figures reported in GGA/GSA.
const PDOP: &str = "2.1";
const HDOP: &str = "1.2";
const VDOP: &str = "1.8";

/// GSA carries at most this many satellite IDs.
const GSA_SLOTS: usize = 12;
/// Satellites per GSV sentence.
const GSV_PER_SENTENCE: usize = 4;

// ── Framing ───────────────────────────────────────────────────────────────────

/// XOR of every byte after the leading `$`, stopping at `*` if present.
pub fn checksum(sentence: &str) -> u8 {
    let body = sentence.strip_prefix('$').unwrap_or(sentence);
    body.bytes().take_while(|&b| b != b'*').fold(0, |acc, b| acc ^ b)
}

/// Append `*XX\r\n` to a `$`-prefixed body.
pub fn frame(body: &str) -> String {
    format!("{body}*{:02X}\r\n", checksum(body))
}

/// True when a framed sentence carries the checksum its body hashes to.
pub fn verify(sentence: &str) -> bool {
    let line = sentence.trim_end_matches(['\r', '\n']);
    let Some((body, tail)) = line.rsplit_once('*') else {
        return false;
    };
    u8::from_str_radix(tail, 16).map_or(false, |sum| tail.len() == 2 && sum == checksum(body))
}

// ── Field formatting ──────────────────────────────────────────────────────────

/// `ddmm.mmmm,H` / `dddmm.mmmm,H`. Minutes are rounded to four places first so
/// a value like 59.99999 carries into the degrees instead of printing 60.0000.
fn coordinate(value: f64, degree_digits: usize, positive: char, negative: char) -> String {
    let abs = value.abs();
    let mut degrees = abs.trunc() as u32;
    let mut minutes = ((abs - abs.trunc()) * 60.0 * 10_000.0).round() / 10_000.0;
    if minutes >= 60.0 {
        degrees += 1;
        minutes -= 60.0;
    }
    let hemisphere = if value < 0.0 { negative } else { positive };
    format!("{degrees:0degree_digits$}{minutes:07.4},{hemisphere}")
}

fn latitude(value: f64) -> String {
    coordinate(value, 2, 'N', 'S')
}

fn longitude(value: f64) -> String {
    coordinate(value, 3, 'E', 'W')
}

/// One decimal; a course that rounds up to 360.0 is reported as 0.0.
fn course(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    let rounded = if rounded >= 360.0 { 0.0 } else { rounded };
    format!("{rounded:.1}")
}

fn hhmmss(ts: &DateTime<Utc>) -> String {
    ts.format("%H%M%S").to_string()
}

/// `hhmmss.ss`
fn hhmmss_cs(ts: &DateTime<Utc>) -> String {
    // leap-second millis can exceed 999
    let centis = (ts.timestamp_subsec_millis() / 10).min(99);
    format!("{}.{centis:02}", ts.format("%H%M%S"))
}

// ── Fix sentences ─────────────────────────────────────────────────────────────

pub fn gga(pos: &Position) -> String {
    frame(&format!(
        "$GPGGA,{},{},{},1,{:02},{HDOP},{:.1},M,0.0,M,,",
        hhmmss(&pos.timestamp),
        latitude(pos.latitude),
        longitude(pos.longitude),
        pos.satellite_count(),
        pos.altitude,
    ))
}

pub fn rmc(pos: &Position) -> String {
    frame(&format!(
        "$GPRMC,{},A,{},{},{:.1},{},{},,,A",
        hhmmss(&pos.timestamp),
        latitude(pos.latitude),
        longitude(pos.longitude),
        pos.speed,
        course(pos.course),
        pos.timestamp.format("%d%m%y"),
    ))
}

pub fn gll(pos: &Position) -> String {
    frame(&format!(
        "$GPGLL,{},{},{},A,A",
        latitude(pos.latitude),
        longitude(pos.longitude),
        hhmmss_cs(&pos.timestamp),
    ))
}

pub fn vtg(pos: &Position) -> String {
    frame(&format!(
        "$GPVTG,{},T,,M,{:.1},N,{:.1},K,A",
        course(pos.course),
        pos.speed,
        pos.speed * KNOTS_TO_KMH,
    ))
}

pub fn gsa(satellites: &[Satellite]) -> String {
    let slots: Vec<String> = (0..GSA_SLOTS)
        .map(|i| satellites.get(i).map(|s| format!("{:02}", s.id)).unwrap_or_default())
        .collect();
    frame(&format!("$GPGSA,A,3,{},{PDOP},{HDOP},{VDOP}", slots.join(",")))
}

/// ⌈n/4⌉ sentences; the last is blank-padded to four satellite slots.
pub fn gsv(satellites: &[Satellite]) -> Vec<String> {
    let total = satellites.len().div_ceil(GSV_PER_SENTENCE);
    satellites
        .chunks(GSV_PER_SENTENCE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut body = format!("$GPGSV,{total},{},{:02}", i + 1, satellites.len());
            for sat in chunk {
                body.push_str(&format!(
                    ",{:02},{:02},{:03},{:02}",
                    sat.id, sat.elevation, sat.azimuth, sat.snr
                ));
            }
            for _ in chunk.len()..GSV_PER_SENTENCE {
                body.push_str(",,,,");
            }
            frame(&body)
        })
        .collect()
}

pub fn zda(ts: &DateTime<Utc>) -> String {
    frame(&format!("$GPZDA,{},{},00,00", hhmmss_cs(ts), ts.format("%d,%m,%Y")))
}

// ── No-fix sentences ──────────────────────────────────────────────────────────

pub fn gga_no_fix(ts: &DateTime<Utc>) -> String {
    frame(&format!("$GPGGA,{},,,,,0,00,,,,,,,,,", hhmmss(ts)))
}

pub fn rmc_no_fix(ts: &DateTime<Utc>) -> String {
    frame(&format!("$GPRMC,{},V,,,,,,,,{},,,N", hhmmss(ts), ts.format("%d%m%y")))
}

pub fn gll_no_fix(ts: &DateTime<Utc>) -> String {
    frame(&format!("$GPGLL,,,,,{},V,N", hhmmss_cs(ts)))
}

pub fn vtg_no_fix() -> String {
    frame("$GPVTG,,,,,,,,,N")
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// All sentences for one tick, in emission order.
pub fn encode(pos: &Position) -> Vec<String> {
    let ts = &pos.timestamp;
    if !pos.is_locked {
        return vec![gga_no_fix(ts), rmc_no_fix(ts), gll_no_fix(ts), vtg_no_fix()];
    }

    let mut out = Vec::with_capacity(6 + pos.satellites.len().div_ceil(GSV_PER_SENTENCE));
    out.push(gga(pos));
    out.push(rmc(pos));
    out.push(gll(pos));
    out.push(vtg(pos));
    out.push(gsa(&pos.satellites));
    out.extend(gsv(&pos.satellites));
    out.push(zda(ts));
    out
}
