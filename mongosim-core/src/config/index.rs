//! Index definition compilation.
//!
//! Compiles a per-index configuration document into the key pattern and
//! driver-level `IndexOptions` used to create the index. Two input shapes are
//! accepted:
//!
//! - `{ key: { field: direction, ... }, <option>: <value>, ... }`: the `key`
//!   sub-document is the key pattern and every sibling entry is an option;
//! - `{ field: direction, ... }`: legacy shorthand, the whole document is
//!   the key pattern and no options apply.
//!
//! Option dispatch is a static table from option name to a typed setter, so
//! adding an option is a data change. An option name outside the table is
//! ignored with a warning, never an error: the compiler stays
//! forward-tolerant of future driver options.

use std::time::Duration;

use mongodb::bson::Document;
use mongodb::options::{
    Collation, CollationAlternate, CollationCaseFirst, CollationMaxVariable, CollationStrength,
    IndexOptions, Sphere2DIndexVersion, TextIndexVersion,
};
use mongodb::IndexModel;

use crate::config::ConfigReader;
use crate::error::MongoSimError;
use crate::Result;

/// A compiled index definition: key pattern plus typed options.
///
/// # Example
/// ```rust
/// use mongodb::bson::doc;
/// use mongosim_core::config::IndexDefinition;
///
/// let config = doc! { "key": { "field1": 1, "field2": -1 }, "name": "myIndex" };
/// let index = IndexDefinition::compile(&config).unwrap();
///
/// assert_eq!(index.keys(), &doc! { "field1": 1, "field2": -1 });
/// assert_eq!(index.options().name.as_deref(), Some("myIndex"));
/// ```
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    keys: Document,
    options: IndexOptions,
}

type OptionSetter = fn(&mut IndexOptions, ConfigReader<'_>, &str) -> Result<()>;

/// Option name to typed setter. Names outside this table are warned and
/// skipped; `key` itself is dispatched before the table is consulted.
static INDEX_OPTION_SETTERS: &[(&str, OptionSetter)] = &[
    ("unique", |o, r, k| {
        o.unique = r.get_bool(k)?;
        Ok(())
    }),
    ("sparse", |o, r, k| {
        o.sparse = r.get_bool(k)?;
        Ok(())
    }),
    ("hidden", |o, r, k| {
        o.hidden = r.get_bool(k)?;
        Ok(())
    }),
    ("background", |o, r, k| {
        o.background = r.get_bool(k)?;
        Ok(())
    }),
    ("name", |o, r, k| {
        o.name = r.get_str(k)?;
        Ok(())
    }),
    ("default_language", |o, r, k| {
        o.default_language = r.get_str(k)?;
        Ok(())
    }),
    ("language_override", |o, r, k| {
        o.language_override = r.get_str(k)?;
        Ok(())
    }),
    ("expireAfterSeconds", |o, r, k| {
        o.expire_after = r.get_i64(k)?.map(to_seconds).transpose()?;
        Ok(())
    }),
    ("partialFilterExpression", |o, r, k| {
        o.partial_filter_expression = r.get_document(k)?.cloned();
        Ok(())
    }),
    ("storageEngine", |o, r, k| {
        o.storage_engine = r.get_document(k)?.cloned();
        Ok(())
    }),
    ("weights", |o, r, k| {
        o.weights = r.get_document(k)?.cloned();
        Ok(())
    }),
    ("wildcardProjection", |o, r, k| {
        o.wildcard_projection = r.get_document(k)?.cloned();
        Ok(())
    }),
    ("textIndexVersion", |o, r, k| {
        o.text_index_version = r.get_i32(k)?.map(to_text_index_version).transpose()?;
        Ok(())
    }),
    ("2dsphereIndexVersion", |o, r, k| {
        o.sphere_2d_index_version = r.get_i32(k)?.map(to_sphere_version).transpose()?;
        Ok(())
    }),
    ("bits", |o, r, k| {
        o.bits = r.get_i32(k)?.map(to_bits).transpose()?;
        Ok(())
    }),
    ("min", |o, r, k| {
        o.min = r.get_f64(k)?;
        Ok(())
    }),
    ("max", |o, r, k| {
        o.max = r.get_f64(k)?;
        Ok(())
    }),
    ("collation", |o, r, k| {
        o.collation = match r.get_document(k)? {
            Some(doc) => Some(compile_collation(doc)?),
            None => None,
        };
        Ok(())
    }),
];

impl IndexDefinition {
    /// Compiles an index configuration document.
    ///
    /// # Errors
    /// Returns a configuration error when an option value has the wrong type,
    /// a recognized token is out of range, or the key pattern is empty.
    pub fn compile(config: &Document) -> Result<Self> {
        let (keys, options) = match config.get_document("key") {
            Ok(key_doc) => (key_doc.clone(), Self::compile_options(config)?),
            // legacy or simple syntax
            Err(_) => (config.clone(), IndexOptions::default()),
        };

        if keys.is_empty() {
            return Err(MongoSimError::configuration(
                "Index definition has an empty key pattern",
            ));
        }

        Ok(Self { keys, options })
    }

    /// The index key pattern (field to direction or type token).
    pub fn keys(&self) -> &Document {
        &self.keys
    }

    /// The compiled index options.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Converts the definition into the driver's `IndexModel`, for the
    /// collaborator that applies indexes to a collection.
    pub fn to_model(&self) -> IndexModel {
        IndexModel::builder()
            .keys(self.keys.clone())
            .options(self.options.clone())
            .build()
    }

    fn compile_options(config: &Document) -> Result<IndexOptions> {
        let reader = ConfigReader::new(config);
        let mut options = IndexOptions::default();

        for (name, _) in config {
            if name == "key" {
                continue;
            }
            match INDEX_OPTION_SETTERS.iter().find(|(n, _)| n == name) {
                Some((_, setter)) => setter(&mut options, reader, name)?,
                None => tracing::warn!("Unrecognized index option: '{}'", name),
            }
        }

        Ok(options)
    }
}

fn to_seconds(value: i64) -> Result<Duration> {
    let secs = u64::try_from(value).map_err(|_| {
        MongoSimError::configuration(format!("expireAfterSeconds must be non-negative, got {}", value))
    })?;
    Ok(Duration::from_secs(secs))
}

fn to_text_index_version(value: i32) -> Result<TextIndexVersion> {
    match value {
        1 => Ok(TextIndexVersion::V1),
        2 => Ok(TextIndexVersion::V2),
        3 => Ok(TextIndexVersion::V3),
        other => Err(MongoSimError::configuration(format!(
            "Unsupported textIndexVersion: {}",
            other
        ))),
    }
}

fn to_sphere_version(value: i32) -> Result<Sphere2DIndexVersion> {
    match value {
        2 => Ok(Sphere2DIndexVersion::V2),
        3 => Ok(Sphere2DIndexVersion::V3),
        other => Err(MongoSimError::configuration(format!(
            "Unsupported 2dsphereIndexVersion: {}",
            other
        ))),
    }
}

fn to_bits(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        MongoSimError::configuration(format!("bits must be non-negative, got {}", value))
    })
}

/// Compiles a collation sub-document into the driver's `Collation`.
///
/// Absent fields take the driver's defaults; `locale` falls back to the
/// server's `simple` binary comparison locale. Unrecognized keys are warned
/// and skipped, matching the treatment of unrecognized index options.
fn compile_collation(config: &Document) -> Result<Collation> {
    let reader = ConfigReader::new(config);

    let locale = reader
        .get_str("locale")?
        .unwrap_or_else(|| "simple".to_string());
    let mut collation = Collation::builder().locale(locale).build();

    for (name, _) in config {
        match name.as_str() {
            "locale" => {}
            "caseLevel" => collation.case_level = reader.get_bool(name)?,
            "caseFirst" => {
                collation.case_first = reader
                    .get_str(name)?
                    .map(|v| to_case_first(&v))
                    .transpose()?;
            }
            "strength" => {
                collation.strength = reader.get_i32(name)?.map(to_strength).transpose()?;
            }
            "numericOrdering" => collation.numeric_ordering = reader.get_bool(name)?,
            "normalization" => collation.normalization = reader.get_bool(name)?,
            "alternate" => {
                collation.alternate = reader
                    .get_str(name)?
                    .map(|v| to_alternate(&v))
                    .transpose()?;
            }
            "maxVariable" => {
                collation.max_variable = reader
                    .get_str(name)?
                    .map(|v| to_max_variable(&v))
                    .transpose()?;
            }
            "backwards" => collation.backwards = reader.get_bool(name)?,
            other => tracing::warn!("Unrecognized collation option: '{}'", other),
        }
    }

    Ok(collation)
}

fn to_case_first(value: &str) -> Result<CollationCaseFirst> {
    match value {
        "upper" => Ok(CollationCaseFirst::Upper),
        "lower" => Ok(CollationCaseFirst::Lower),
        "off" => Ok(CollationCaseFirst::Off),
        other => Err(MongoSimError::configuration(format!(
            "Invalid collation caseFirst: '{}'",
            other
        ))),
    }
}

fn to_strength(value: i32) -> Result<CollationStrength> {
    match value {
        1 => Ok(CollationStrength::Primary),
        2 => Ok(CollationStrength::Secondary),
        3 => Ok(CollationStrength::Tertiary),
        4 => Ok(CollationStrength::Quaternary),
        5 => Ok(CollationStrength::Identical),
        other => Err(MongoSimError::configuration(format!(
            "Invalid collation strength: {}",
            other
        ))),
    }
}

fn to_alternate(value: &str) -> Result<CollationAlternate> {
    match value {
        "non-ignorable" => Ok(CollationAlternate::NonIgnorable),
        "shifted" => Ok(CollationAlternate::Shifted),
        other => Err(MongoSimError::configuration(format!(
            "Invalid collation alternate: '{}'",
            other
        ))),
    }
}

fn to_max_variable(value: &str) -> Result<CollationMaxVariable> {
    match value {
        "punct" => Ok(CollationMaxVariable::Punct),
        "space" => Ok(CollationMaxVariable::Space),
        other => Err(MongoSimError::configuration(format!(
            "Invalid collation maxVariable: '{}'",
            other
        ))),
    }
}
