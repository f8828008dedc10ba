// src/client/tests/fdsn_tests.rs

use chrono::{TimeZone, Utc};

use crate::client::fdsn::{parse_channels, parse_events, parse_stations};
use crate::error::ErrorKind;

pub(crate) const EVENTS_TEXT: &str = "\
#EventID | Time | Latitude | Longitude | Depth/km | Author | Catalog | Contributor | ContributorID | MagType | Magnitude | MagAuthor | EventLocationName
11793085|2024-03-01T12:00:00.5|35.0|-117.0|8.2|ISC|ISC|ISC|600000001|ML|4.4|ISC|SOUTHERN CALIFORNIA
11793090|2024-03-01T13:10:00|-20.5|-70.1|35.0|NEIC|NEIC PDE|us|us7000abcd|mb||NEIC|NEAR COAST OF NORTHERN CHILE
";

pub(crate) const STATIONS_TEXT: &str = "\
#Network | Station | Latitude | Longitude | Elevation | SiteName | StartTime | EndTime
IU|ANMO|34.9459|-106.4572|1850.0|Albuquerque, New Mexico, USA|2002-11-19T21:07:00|
US|WMOK|34.7379|-98.7810|486.0|Wichita Mountains, Oklahoma, USA|2006-02-21T00:00:00|2599-12-31T23:59:59
";

pub(crate) const CHANNELS_TEXT: &str = "\
#Network | Station | Location | Channel | Latitude | Longitude | Elevation | Depth | Azimuth | Dip | SensorDescription | Scale | ScaleFreq | ScaleUnits | SampleRate | StartTime | EndTime
IU|ANMO|00|BHZ|34.9459|-106.4572|1850.0|100.0|0.0|-90.0|Streckeisen STS-6A VBB Seismometer|2000.0|0.02|M/S|40.0|2018-07-09T20:45:00|
IU|ANMO|10|BHZ|34.9459|-106.4572|1850.0|57.0|0.0|-90.0|Guralp CMG3-T Seismometer|4000.0|0.02|M/S|40.0|2018-07-09T20:45:00|
";

#[test]
fn test_parse_events() {
    let events = parse_events(EVENTS_TEXT).unwrap();
    assert_eq!(events.len(), 2);

    let first = &events[0];
    assert_eq!(first.event_id, "11793085");
    assert_eq!(
        first.time,
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(500)
    );
    assert_eq!(first.magnitude, Some(4.4));
    assert_eq!(first.magnitude_type, "ML");
    assert_eq!(first.location_name, "SOUTHERN CALIFORNIA");

    // Blank magnitude column
    assert_eq!(events[1].magnitude, None);
    assert_eq!(events[1].catalog, "NEIC PDE");
}

#[test]
fn test_parse_stations() {
    let stations = parse_stations(STATIONS_TEXT).unwrap();
    assert_eq!(stations.len(), 2);
    assert_eq!(stations[0].site_name, "Albuquerque, New Mexico, USA");
    assert_eq!(stations[0].end_time, None);
    assert!(stations[1].end_time.is_some());
}

#[test]
fn test_parse_channels() {
    let channels = parse_channels(CHANNELS_TEXT).unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].id(), "IU.ANMO.00.BHZ");
    assert_eq!(channels[0].scale, Some(2000.0));
    assert_eq!(channels[0].scale_units, "M/S");
    assert_eq!(channels[1].sample_rate, 40.0);
    assert_eq!(channels[1].dip, Some(-90.0));
}

#[test]
fn test_empty_body_means_no_data() {
    assert!(parse_events("").unwrap().is_empty());
    assert!(parse_stations("#Network | Station\n").unwrap().is_empty());
}

#[test]
fn test_malformed_rows_are_data_format_errors() {
    let err = parse_stations("IU|ANMO|34.9\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DataFormat);
    assert!(err.message.contains("Line 1"));

    let bad_number = STATIONS_TEXT.replace("34.9459", "north");
    assert_eq!(parse_stations(&bad_number).unwrap_err().kind, ErrorKind::DataFormat);

    let bad_time = EVENTS_TEXT.replace("2024-03-01T12:00:00.5", "yesterday");
    assert_eq!(parse_events(&bad_time).unwrap_err().kind, ErrorKind::DataFormat);
}
