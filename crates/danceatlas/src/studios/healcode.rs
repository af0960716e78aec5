//! Field reader for the Healcode / Mindbody branded widget (`bw-*` classes) that several
//! studios embed. Only the markup of one session card is shared; how the cards are reached
//! differs per site.

use chrono_tz::Tz;

use super::parser::parse_iso_datetime;
use super::{CrawlError, Navigator};
use crate::driver::{Element, Locator};
use crate::types::SessionRecord;

pub(crate) const START_TIME: &str = "time.hc_starttime";
pub(crate) const END_TIME: &str = "time.hc_endtime";
pub(crate) const NAME: &str = ".bw-session__name";
pub(crate) const STAFF: &str = ".bw-session__staff";
pub(crate) const LEVEL: &str = ".bw-session__level";
pub(crate) const LOCATION: &str = ".bw-session__location";

/// Reads one session card. Start, end and name are required; staff, level and location
/// degrade to defaults.
pub(crate) fn read_session(
    nav: &mut Navigator,
    session: &Element,
    zone: Tz,
) -> Result<SessionRecord, CrawlError> {
    let start = nav.attr_in(session, &Locator::css(START_TIME), "datetime")?;
    let end = nav.attr_in(session, &Locator::css(END_TIME), "datetime")?;
    let start = parse_iso_datetime(&start, zone)?;
    let end = parse_iso_datetime(&end, zone)?;
    let name = nav.text_in(session, &Locator::css(NAME))?;
    let url = nav.current_url();

    let instructor = nav.optional_text_in(session, &Locator::css(STAFF));
    let level = nav.optional_text_in(session, &Locator::css(LEVEL));
    let location = nav.optional_text_in(session, &Locator::css(LOCATION));

    Ok(SessionRecord::new(zone, start, end, &name, &url)?
        .with_instructor(instructor)
        .with_level(level)
        .with_location(location))
}

/// Reads every card in `sessions`, logging and skipping the ones that fail.
pub(crate) fn read_sessions(
    nav: &mut Navigator,
    sessions: &[Element],
    zone: Tz,
    context: &str,
) -> Vec<SessionRecord> {
    sessions
        .iter()
        .enumerate()
        .filter_map(|(i, session)| {
            read_session(nav, session, zone)
                .inspect_err(|e| log::warn!("Skipping session {} of {}: {}", i, context, e))
                .ok()
        })
        .collect()
}
