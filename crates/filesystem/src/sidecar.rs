//! Side-car JSON metadata (`<file>.json`) exported next to each media file.
//!
//! Two layouts are understood: the Takeout export (`photoTakenTime.timestamp`,
//! `people[].name`) and a flat layout with RFC 3339 times and string lists.
//! Both are flattened into the string map attached to uploaded objects.

use chrono::{DateTime, SecondsFormat, Utc};
use media_relay_common::MetadataMap;
use serde::Deserialize;

const SIDECAR_SUFFIX: &str = ".json";

/// Whether `path` is the side-car of another file (`a.jpg.json`).
pub fn is_sidecar_path(path: &str) -> bool {
    let lower: String = path.to_ascii_lowercase();
    match lower.strip_suffix(SIDECAR_SUFFIX) {
        Some(stem) => std::path::Path::new(stem).extension().is_some(),
        None => false,
    }
}

/// Side-car path for a media file.
pub fn sidecar_path_for(path: &str) -> String {
    format!("{}{}", path, SIDECAR_SUFFIX)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeField {
    Rfc3339(String),
    Takeout { timestamp: String },
}

impl TimeField {
    fn to_rfc3339(&self) -> Option<String> {
        let parsed: DateTime<Utc> = match self {
            TimeField::Rfc3339(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
            TimeField::Takeout { timestamp } => {
                DateTime::from_timestamp(timestamp.trim().parse::<i64>().ok()?, 0)?
            }
        };
        Some(parsed.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Person {
    Name(String),
    Named { name: String },
}

impl Person {
    fn name(&self) -> &str {
        match self {
            Person::Name(name) => name,
            Person::Named { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeoData {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct CameraData {
    #[serde(default)]
    make: String,
    #[serde(default)]
    model: String,
}

/// Parsed side-car document.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Sidecar {
    title: Option<String>,
    description: Option<String>,
    photo_taken_time: Option<TimeField>,
    creation_time: Option<TimeField>,
    modification_time: Option<TimeField>,
    geo_data: Option<GeoData>,
    camera_data: Option<CameraData>,
    tags: Vec<String>,
    albums: Vec<String>,
    people: Vec<Person>,
    source: Option<String>,
}

impl Sidecar {
    /// Parse a side-car document.
    ///
    /// # Errors
    /// Returns error if the bytes are not a JSON object of the expected shape.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Flatten into object metadata.
    ///
    /// `title` falls back to `file_name`. Unknown coordinates (`0, 0`) are dropped.
    pub fn to_metadata(&self, file_name: &str) -> MetadataMap {
        let mut map: MetadataMap = MetadataMap::new();

        let title: &str = self
            .title
            .as_deref()
            .filter(|t: &&str| !t.is_empty())
            .unwrap_or(file_name);
        map.insert("title".into(), title.to_string());

        insert_non_empty(&mut map, "description", self.description.as_deref());
        insert_non_empty(&mut map, "source", self.source.as_deref());

        let created: Option<String> = self
            .photo_taken_time
            .as_ref()
            .or(self.creation_time.as_ref())
            .and_then(TimeField::to_rfc3339);
        insert_non_empty(&mut map, "creation-time", created.as_deref());

        let modified: Option<String> = self
            .modification_time
            .as_ref()
            .and_then(TimeField::to_rfc3339);
        insert_non_empty(&mut map, "modification-time", modified.as_deref());

        if let Some(geo) = &self.geo_data {
            if geo.latitude != 0.0 || geo.longitude != 0.0 {
                map.insert("geo-latitude".into(), format!("{:.6}", geo.latitude));
                map.insert("geo-longitude".into(), format!("{:.6}", geo.longitude));
                if geo.altitude != 0.0 {
                    map.insert("geo-altitude".into(), format!("{:.6}", geo.altitude));
                }
            }
        }

        if let Some(camera) = &self.camera_data {
            insert_non_empty(&mut map, "camera-make", Some(camera.make.as_str()));
            insert_non_empty(&mut map, "camera-model", Some(camera.model.as_str()));
        }

        if !self.tags.is_empty() {
            map.insert("tags".into(), self.tags.join(","));
        }
        if !self.albums.is_empty() {
            map.insert("albums".into(), self.albums.join(","));
        }
        if !self.people.is_empty() {
            let names: Vec<&str> = self.people.iter().map(Person::name).collect();
            map.insert("people".into(), names.join(","));
        }

        map
    }
}

fn insert_non_empty(map: &mut MetadataMap, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v: &&str| !v.is_empty()) {
        map.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_detection() {
        assert!(is_sidecar_path("Photos/IMG_0001.jpg.json"));
        assert!(is_sidecar_path("Photos/IMG_0001.JPG.JSON"));
        assert!(!is_sidecar_path("Photos/metadata.json"));
        assert!(!is_sidecar_path("Photos/IMG_0001.jpg"));
        assert_eq!(sidecar_path_for("a/b.jpg"), "a/b.jpg.json");
    }

    #[test]
    fn test_takeout_layout() {
        let sidecar: Sidecar = Sidecar::parse(
            br#"{
                "title": "IMG_0001.jpg",
                "description": "Beach",
                "photoTakenTime": {"timestamp": "1563200000", "formatted": "Jul 15, 2019"},
                "geoData": {"latitude": 48.8584, "longitude": 2.2945, "altitude": 0.0},
                "people": [{"name": "Alex"}, {"name": "Sam"}]
            }"#,
        )
        .unwrap();
        let map: MetadataMap = sidecar.to_metadata("IMG_0001.jpg");

        assert_eq!(map["title"], "IMG_0001.jpg");
        assert_eq!(map["description"], "Beach");
        assert_eq!(map["creation-time"], "2019-07-15T14:13:20Z");
        assert_eq!(map["geo-latitude"], "48.858400");
        assert!(!map.contains_key("geo-altitude"));
        assert_eq!(map["people"], "Alex,Sam");
    }

    #[test]
    fn test_flat_layout() {
        let sidecar: Sidecar = Sidecar::parse(
            br#"{
                "creationTime": "2020-01-02T03:04:05+01:00",
                "cameraData": {"make": "Canon", "model": ""},
                "tags": ["a", "b"],
                "albums": ["Trip"]
            }"#,
        )
        .unwrap();
        let map: MetadataMap = sidecar.to_metadata("clip.mov");

        assert_eq!(map["title"], "clip.mov");
        assert_eq!(map["creation-time"], "2020-01-02T02:04:05Z");
        assert_eq!(map["camera-make"], "Canon");
        assert!(!map.contains_key("camera-model"));
        assert_eq!(map["tags"], "a,b");
        assert_eq!(map["albums"], "Trip");
    }

    #[test]
    fn test_unknown_location_dropped() {
        let sidecar: Sidecar =
            Sidecar::parse(br#"{"geoData": {"latitude": 0.0, "longitude": 0.0}}"#).unwrap();
        assert!(!sidecar.to_metadata("a.jpg").contains_key("geo-latitude"));
    }

    #[test]
    fn test_invalid_document() {
        assert!(Sidecar::parse(br#""not an object""#).is_err());
    }
}
