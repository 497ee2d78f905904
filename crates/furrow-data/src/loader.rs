//! Loading pipeline: finds data files, deserializes them, resolves plant
//! references, and builds the world config and catalog.
//!
//! A data directory holds `world`, `plants`, and optionally `structures`,
//! each in exactly one of RON, TOML, or JSON. TOML list files keep their
//! entries under a top-level key (`[[plants]]`, `[[structures]]`).

use crate::schema::{PlantData, StructureData, WorldData};
use furrow_core::catalog::{Catalog, CatalogBuilder, CatalogError};
use furrow_core::config::{ConfigError, WorldConfig};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ===========================================================================
// Errors
// ===========================================================================

/// Why a data directory could not be turned into [`FarmData`].
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("no '{file}' data file in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("{file} is not a .ron, .toml or .json file")]
    UnsupportedFormat { file: PathBuf },

    /// The same base name exists in two formats.
    #[error("both {a} and {b} exist")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("{file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A hybrid names a parent plant that is not defined.
    #[error("{file}: unknown {expected_kind} '{name}'")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("{file}: '{name}' is defined twice")]
    DuplicateName { file: PathBuf, name: String },

    #[error("invalid world config in {file}: {source}")]
    Config {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

const EXTENSIONS: [&str; 3] = ["ron", "toml", "json"];

/// Find `{base_name}.{ron,toml,json}` in `dir`. More than one match is a
/// [`DataLoadError::ConflictingFormats`].
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in EXTENSIONS {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list. RON and JSON files hold the list itself; TOML files
/// hold it under `toml_key`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .remove(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Names
// ===========================================================================

pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything a peer needs before it can build its world store.
#[derive(Debug, Clone)]
pub struct FarmData {
    pub config: WorldConfig,
    pub catalog: Catalog,
}

/// Load and validate the world config and catalog in `dir`.
pub fn load_farm_data(dir: &Path) -> Result<FarmData, DataLoadError> {
    let world_path = require_data_file(dir, "world")?;
    let config = load_world(&world_path)?;

    let plants_path = require_data_file(dir, "plants")?;
    let plants: Vec<PlantData> = deserialize_list(&plants_path, "plants")?;

    let structures = match find_data_file(dir, "structures")? {
        Some(path) => {
            let list: Vec<StructureData> = deserialize_list(&path, "structures")?;
            Some((path, list))
        }
        None => None,
    };

    let mut builder = CatalogBuilder::new();

    // Name -> position in the file.
    let mut plant_names: HashMap<String, usize> = HashMap::new();
    for (index, plant) in plants.iter().enumerate() {
        check_duplicate(&plant_names, &plant.name, &plants_path)?;
        plant_names.insert(plant.name.clone(), index);
    }
    for plant in plants {
        if let Some(hybrid) = &plant.hybrid {
            resolve_name(&plant_names, &hybrid.parents.0, &plants_path, "plant")?;
            resolve_name(&plant_names, &hybrid.parents.1, &plants_path, "plant")?;
        }
        builder.register_plant(plant.into_def());
    }

    if let Some((path, list)) = structures {
        let mut names: HashMap<String, usize> = HashMap::new();
        for (index, structure) in list.into_iter().enumerate() {
            check_duplicate(&names, &structure.name, &path)?;
            names.insert(structure.name.clone(), index);
            builder.register_structure(structure.into_def());
        }
    } else {
        debug!(dir = %dir.display(), "no structures file");
    }

    let catalog = builder.build()?;
    info!(
        dir = %dir.display(),
        sections = config.sections.len(),
        plants = catalog.plant_count(),
        structures = catalog.structure_count(),
        "farm data loaded"
    );
    Ok(FarmData { config, catalog })
}

/// Load and validate a world layout file.
pub fn load_world(path: &Path) -> Result<WorldConfig, DataLoadError> {
    let data: WorldData = deserialize_file(path)?;
    let config = data.into_config();
    config.validate().map_err(|source| DataLoadError::Config {
        file: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use furrow_core::id::{PlantId, SectionId, StructureId};
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "furrow_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const WORLD_RON: &str = r#"(
        chunk_size: 16,
        sections: [(id: 1, chunk_start_x: 0, chunk_start_y: 0, chunk_extent_x: 2, chunk_extent_y: 2)],
    )"#;

    const PLANTS_RON: &str = r#"[
        (name: "turnip", stage_days: [1, 2, 3], pollen_stage: Some(1)),
        (name: "carrot", stage_days: [2, 2], pollen_stage: Some(2)),
        (name: "glowroot", stage_days: [1, 1],
         hybrid: Some((parents: ("turnip", "carrot"), sprite_sheet: "glowroot"))),
    ]"#;

    // -----------------------------------------------------------------------
    // Format detection and discovery
    // -----------------------------------------------------------------------

    #[test]
    fn detect_formats() {
        assert_eq!(detect_format(Path::new("plants.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("plants.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("plants.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("plants.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(Path::new("plants")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn find_data_file_cases() {
        let dir = make_test_dir("find");
        assert_eq!(find_data_file(&dir, "plants").unwrap(), None);

        fs::write(dir.join("plants.json"), "[]").unwrap();
        assert_eq!(
            find_data_file(&dir, "plants").unwrap(),
            Some(dir.join("plants.json"))
        );

        fs::write(dir.join("plants.ron"), "[]").unwrap();
        assert!(matches!(
            find_data_file(&dir, "plants"),
            Err(DataLoadError::ConflictingFormats { .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn require_data_file_missing() {
        let dir = make_test_dir("require_missing");
        let result = require_data_file(&dir, "world");
        assert!(matches!(
            result,
            Err(DataLoadError::MissingRequired { ref file, .. }) if file == "world"
        ));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    #[test]
    fn deserialize_list_toml_and_missing_key() {
        let dir = make_test_dir("list_toml");
        let path = dir.join("structures.toml");
        fs::write(
            &path,
            r#"
[[structures]]
name = "fence"

[[structures]]
name = "well"
sprite = "well_stone"
"#,
        )
        .unwrap();
        let list: Vec<StructureData> = deserialize_list(&path, "structures").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].sprite.as_deref(), Some("well_stone"));

        let result: Result<Vec<StructureData>, _> = deserialize_list(&path, "plants");
        assert!(matches!(result, Err(DataLoadError::Parse { .. })));

        cleanup(&dir);
    }

    #[test]
    fn parse_error_names_file() {
        let dir = make_test_dir("parse_err");
        let path = dir.join("plants.ron");
        fs::write(&path, "this is not valid RON {{{").unwrap();
        let result: Result<Vec<PlantData>, _> = deserialize_list(&path, "plants");
        let err = result.unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { .. }));
        assert!(err.to_string().contains("plants.ron"));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    #[test]
    fn load_ron_directory() {
        let dir = make_test_dir("load_ron");
        fs::write(dir.join("world.ron"), WORLD_RON).unwrap();
        fs::write(dir.join("plants.ron"), PLANTS_RON).unwrap();
        fs::write(dir.join("structures.ron"), r#"[(name: "fence", sprite: Some("fence_post"))]"#)
            .unwrap();

        let data = load_farm_data(&dir).unwrap();
        assert_eq!(data.config.chunk_size, 16);
        assert_eq!(data.config.sections[0].id, SectionId(1));
        assert_eq!(data.catalog.plant_count(), 3);
        let hybrid = data
            .catalog
            .hybrid_of(&PlantId::from("carrot"), &PlantId::from("turnip"))
            .unwrap();
        assert_eq!(hybrid.id, PlantId::from("glowroot"));
        assert_eq!(
            data.catalog.structure(&StructureId::from("fence")).unwrap().sprite,
            "fence_post"
        );

        cleanup(&dir);
    }

    #[test]
    fn load_mixed_formats_without_structures() {
        let dir = make_test_dir("load_mixed");
        fs::write(
            dir.join("world.toml"),
            r#"
chunk_size = 30

[[sections]]
id = 1
chunk_start_x = 0
chunk_start_y = 0
chunk_extent_x = 1
chunk_extent_y = 1
"#,
        )
        .unwrap();
        fs::write(
            dir.join("plants.json"),
            r#"[{"name": "turnip", "stage_days": [1]}]"#,
        )
        .unwrap();

        let data = load_farm_data(&dir).unwrap();
        assert_eq!(data.catalog.plant_count(), 1);
        assert_eq!(data.catalog.structure_count(), 0);

        cleanup(&dir);
    }

    #[test]
    fn duplicate_plant_rejected() {
        let dir = make_test_dir("dup_plant");
        fs::write(dir.join("world.ron"), WORLD_RON).unwrap();
        fs::write(
            dir.join("plants.ron"),
            r#"[(name: "turnip", stage_days: [1]), (name: "turnip", stage_days: [2])]"#,
        )
        .unwrap();

        let result = load_farm_data(&dir);
        assert!(matches!(
            result,
            Err(DataLoadError::DuplicateName { ref name, .. }) if name == "turnip"
        ));

        cleanup(&dir);
    }

    #[test]
    fn unknown_hybrid_parent_rejected() {
        let dir = make_test_dir("bad_parent");
        fs::write(dir.join("world.ron"), WORLD_RON).unwrap();
        fs::write(
            dir.join("plants.ron"),
            r#"[(name: "glowroot", stage_days: [1],
                 hybrid: Some((parents: ("turnip", "carrot"), sprite_sheet: "g")))]"#,
        )
        .unwrap();

        let result = load_farm_data(&dir);
        assert!(matches!(
            result,
            Err(DataLoadError::UnresolvedRef { ref name, expected_kind: "plant", .. }) if name == "turnip"
        ));

        cleanup(&dir);
    }

    #[test]
    fn duplicate_hybrid_pair_rejected_by_catalog() {
        let dir = make_test_dir("dup_pair");
        fs::write(dir.join("world.ron"), WORLD_RON).unwrap();
        fs::write(
            dir.join("plants.ron"),
            r#"[
                (name: "a", stage_days: [1]),
                (name: "b", stage_days: [1]),
                (name: "ab", stage_days: [1], hybrid: Some((parents: ("a", "b"), sprite_sheet: "ab"))),
                (name: "ba", stage_days: [1], hybrid: Some((parents: ("b", "a"), sprite_sheet: "ba"))),
            ]"#,
        )
        .unwrap();

        let result = load_farm_data(&dir);
        assert!(matches!(
            result,
            Err(DataLoadError::Catalog(CatalogError::DuplicateHybridPair { .. }))
        ));

        cleanup(&dir);
    }

    #[test]
    fn invalid_world_config_rejected() {
        let dir = make_test_dir("bad_world");
        fs::write(dir.join("world.ron"), r#"(chunk_size: 0)"#).unwrap();
        fs::write(dir.join("plants.ron"), "[]").unwrap();

        let result = load_farm_data(&dir);
        assert!(matches!(
            result,
            Err(DataLoadError::Config {
                source: ConfigError::InvalidChunkSize(0),
                ..
            })
        ));

        cleanup(&dir);
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let data_err: DataLoadError = io_err.into();
        assert!(matches!(data_err, DataLoadError::Io(_)));
        assert!(format!("{data_err}").contains("file not found"));
    }
}
