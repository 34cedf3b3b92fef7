use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    path::Path,
};
use thiserror::Error;

use crate::session::Session;

#[derive(Debug, Error)]
pub enum GeographyError {
    #[error("couldn't read geography document: {0}")]
    Io(#[from] io::Error),

    #[error("geography document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("geography document has neither GeoJSON features nor TopoJSON objects")]
    UnknownFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Paint {
    pub fill: &'static str,
    pub stroke: &'static str,
    #[serde(rename = "strokeWidth")]
    pub stroke_width: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PaintStyle {
    pub default: Paint,
    pub hover: Paint,
    pub pressed: Paint,
}

const fn style(
    default: &'static str,
    hover: &'static str,
    pressed: &'static str,
    stroke_width: u8,
) -> PaintStyle {
    const STROKE: &str = "#ffffff";

    PaintStyle {
        default: Paint {
            fill: default,
            stroke: STROKE,
            stroke_width,
        },
        hover: Paint {
            fill: hover,
            stroke: STROKE,
            stroke_width,
        },
        pressed: Paint {
            fill: pressed,
            stroke: STROKE,
            stroke_width,
        },
    }
}

pub const TARGET_STYLE: PaintStyle = style("#ef4444", "#dc2626", "#b91c1c", 2);
pub const SOLVED_STYLE: PaintStyle = style("#3b82f6", "#2563eb", "#1d4ed8", 1);
pub const NEUTRAL_STYLE: PaintStyle = style("#e5e7eb", "#d1d5db", "#9ca3af", 1);

/// Picks the paint for one region: the current target wins over solved
/// regions, everything else is neutral.
pub fn style_for(code: &str, session: &Session) -> PaintStyle {
    match session.target() {
        Some(target) if target.id == code => TARGET_STYLE,
        _ if session.guessed().contains(code) => SOLVED_STYLE,
        _ => NEUTRAL_STYLE,
    }
}

/// Styles for every region of the document, keyed by region code.
pub fn style_sheet(
    geography: &GeographyDocument,
    session: &Session,
) -> BTreeMap<String, PaintStyle> {
    geography
        .codes()
        .map(|code| (code.to_string(), style_for(code, session)))
        .collect()
}

/// A static GeoJSON or TopoJSON document. The body is kept as-is for the
/// browser; only the region codes are pulled out.
#[derive(Clone, Debug)]
pub struct GeographyDocument {
    body: Value,
    codes: BTreeSet<String>,
}

impl GeographyDocument {
    pub fn load(
        path: impl AsRef<Path>,
        code_property: &str,
    ) -> Result<GeographyDocument, GeographyError> {
        let source = std::fs::read_to_string(path)?;
        GeographyDocument::parse(&source, code_property)
    }

    pub fn parse(source: &str, code_property: &str) -> Result<GeographyDocument, GeographyError> {
        let body: Value = serde_json::from_str(source)?;

        let features: Vec<&Value> = if let Some(features) = body["features"].as_array() {
            features.iter().collect()
        } else if let Some(objects) = body["objects"].as_object() {
            objects
                .values()
                .filter_map(|object| object["geometries"].as_array())
                .flatten()
                .collect()
        } else {
            return Err(GeographyError::UnknownFormat);
        };

        let codes = features
            .into_iter()
            .filter_map(|feature| {
                feature["properties"][code_property]
                    .as_str()
                    .or_else(|| feature["id"].as_str())
            })
            .map(String::from)
            .collect();

        Ok(GeographyDocument { body, codes })
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

/// Outcome of the one-time load at startup.
#[derive(Clone, Debug)]
pub enum Geography {
    Loaded(GeographyDocument),
    Failed(String),
}

impl Geography {
    pub fn load(path: impl AsRef<Path>, code_property: &str) -> Geography {
        let path = path.as_ref();
        match GeographyDocument::load(path, code_property) {
            Ok(document) => {
                tracing::info!(
                    path = %path.display(),
                    regions = document.codes.len(),
                    "loaded geography document"
                );
                Geography::Loaded(document)
            }
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "geography document failed to load");
                Geography::Failed(error.to_string())
            }
        }
    }

    pub fn document(&self) -> Option<&GeographyDocument> {
        match self {
            Geography::Loaded(document) => Some(document),
            Geography::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Catalog, Country, GameConfig};
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::Arc;

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": { "ISO_A3": "FRA", "NAME": "France" }, "geometry": null },
            { "type": "Feature", "properties": { "ISO_A3": "DEU" }, "geometry": null },
            { "type": "Feature", "properties": { "ISO_A3": "ESP" }, "geometry": null },
            { "type": "Feature", "properties": { "NAME": "Antarctica" }, "geometry": null }
        ]
    }"#;

    const TOPOJSON: &str = r#"{
        "type": "Topology",
        "arcs": [],
        "objects": {
            "countries": {
                "type": "GeometryCollection",
                "geometries": [
                    { "type": "Polygon", "arcs": [], "properties": { "ISO_A3": "ITA" } },
                    { "type": "Polygon", "arcs": [], "id": "AUT", "properties": {} }
                ]
            }
        }
    }"#;

    fn session() -> Session {
        let catalog = Catalog::new(vec![
            Country::new("FRA", "France", "Paris"),
            Country::new("DEU", "Allemagne", "Berlin"),
        ])
        .unwrap();
        let mut session = Session::new(Arc::new(catalog), &GameConfig::default());
        session.start(&mut StdRng::seed_from_u64(1));
        session
    }

    #[test]
    fn reads_codes_from_geojson_features() {
        let document = GeographyDocument::parse(GEOJSON, "ISO_A3").unwrap();
        assert_eq!(document.codes().collect::<Vec<_>>(), vec!["DEU", "ESP", "FRA"]);
    }

    #[test]
    fn reads_codes_from_topojson_objects() {
        let document = GeographyDocument::parse(TOPOJSON, "ISO_A3").unwrap();
        assert_eq!(document.codes().collect::<Vec<_>>(), vec!["AUT", "ITA"]);
        assert_eq!(document.body()["type"], "Topology");
    }

    #[test]
    fn rejects_unknown_documents() {
        assert!(matches!(
            GeographyDocument::parse(r#"{"type": "Point"}"#, "ISO_A3"),
            Err(GeographyError::UnknownFormat)
        ));
        assert!(matches!(
            GeographyDocument::parse("not json", "ISO_A3"),
            Err(GeographyError::Json(_))
        ));
    }

    #[test]
    fn missing_file_becomes_failed_state() {
        let geography = Geography::load("does/not/exist.json", "ISO_A3");
        assert!(matches!(geography, Geography::Failed(_)));
        assert!(geography.document().is_none());
    }

    #[test]
    fn target_style_takes_priority() {
        let mut session = session();
        let target = session.target().unwrap().id.clone();

        assert_eq!(style_for(&target, &session), TARGET_STYLE);
        assert_eq!(style_for("ESP", &session), NEUTRAL_STYLE);

        let name = session.target().unwrap().name.clone();
        session.set_input(&name);
        session.guess();

        // solved but still the target until the round advances
        assert!(session.guessed().contains(&target));
        assert_eq!(style_for(&target, &session), TARGET_STYLE);
    }

    #[test]
    fn style_sheet_covers_every_region() {
        let mut session = session();
        let first = session.target().unwrap().clone();
        session.set_input(&first.name);
        session.guess();
        session.skip(&mut StdRng::seed_from_u64(2));

        let document = GeographyDocument::parse(GEOJSON, "ISO_A3").unwrap();
        let sheet = style_sheet(&document, &session);

        let second = session.target().unwrap().id.clone();
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet[&first.id], SOLVED_STYLE);
        assert_eq!(sheet[&second], TARGET_STYLE);
        assert_eq!(sheet["ESP"], NEUTRAL_STYLE);
    }
}
