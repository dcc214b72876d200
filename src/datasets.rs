//! Built-in record strategies for the card-game catalogues the seeder ships with.

use crate::config::NAMESPACE_SEED_PREFIX;
use crate::error::RecordError;
use crate::payload::{self, Payload};
use crate::strategy::{namespaced_id, IdentitySource, Strategy};
use serde_json::{Number, Value};
use std::fmt;
use uuid::Uuid;

const MTG_SET_FIELDS: &[&str] = &["id", "name", "path", "numberCardsInSet"];

const PKM_SET_LEGACY_FIELDS: &[&str] = &["total", "updatedAt"];

const PKM_CARD_FIELDS: &[&str] = &[
    "abilities",
    "ancientTrait",
    "artist",
    "attacks",
    "cId",
    "convertedRetreatCost",
    "evolvesFrom",
    "evolvesTo",
    "flavorText",
    "hp",
    "images",
    "lang",
    "legalities",
    "level",
    "name",
    "nationalPokedexNumbers",
    "number",
    "oracleId",
    "path",
    "rarity",
    "regulationMark",
    "resistances",
    "retreatCost",
    "rules",
    "sId",
    "subtypes",
    "supertype",
    "tcgLandPublicId",
    "tcgPlayerIds",
    "types",
    "weaknesses",
];

/// String fields that make up a Pokémon card slug, in order.
const PKM_CARD_SLUG_FIELDS: &[&str] = &[
    "tcgLandPublicId",
    "sId",
    "cId",
    "lang",
    "number",
    "name",
    "oracleId",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    MtgCards,
    MtgSets,
    PkmCards,
    PkmSets,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::MtgCards,
        Dataset::MtgSets,
        Dataset::PkmCards,
        Dataset::PkmSets,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::MtgCards => "mtg-cards",
            Dataset::MtgSets => "mtg-sets",
            Dataset::PkmCards => "pkm-cards",
            Dataset::PkmSets => "pkm-sets",
        }
    }

    pub fn default_table(self) -> &'static str {
        match self {
            Dataset::MtgCards => "mtg_cards",
            Dataset::MtgSets => "mtg_sets",
            Dataset::PkmCards => "pkm_cards",
            Dataset::PkmSets => "pkm_sets",
        }
    }

    /// UUID namespace entity identifiers are derived under unless overridden.
    ///
    /// Pokémon cards hash their public id under a namespace of their own, so
    /// card identifiers never collide with the set namespace family.
    pub fn default_namespace(self) -> Uuid {
        let seed = match self {
            Dataset::PkmCards => format!("{NAMESPACE_SEED_PREFIX}/pkm-cards-entity"),
            other => format!("{NAMESPACE_SEED_PREFIX}/{}", other.name()),
        };
        Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
    }

    pub fn strategy(self, namespace: Uuid) -> Strategy {
        match self {
            Dataset::MtgCards => {
                Strategy::new(self.name(), mtg_card_key, IdentitySource::Namespace(namespace))
            }
            Dataset::MtgSets => {
                Strategy::new(self.name(), id_key, IdentitySource::Namespace(namespace))
                    .with_mutate(|p: &mut Payload| Ok(payload::retain_fields(p, MTG_SET_FIELDS)))
            }
            Dataset::PkmSets => {
                Strategy::new(self.name(), id_key, IdentitySource::Namespace(namespace))
                    .with_mutate(|p: &mut Payload| {
                        Ok(payload::remove_fields(p, PKM_SET_LEGACY_FIELDS))
                    })
            }
            Dataset::PkmCards => Strategy::new(
                self.name(),
                pkm_card_key,
                IdentitySource::function(move |p: &Payload, _key: &str| {
                    let public_id = payload::string_field(p, "tcgLandPublicId")?;
                    Ok(namespaced_id(&namespace, public_id))
                }),
            )
            .with_mutate(|p: &mut Payload| Ok(payload::retain_fields(p, PKM_CARD_FIELDS)))
            .with_slug_source(pkm_card_slug_source),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn id_key(p: &Payload) -> Result<String, RecordError> {
    Ok(payload::string_field(p, "id")?.to_string())
}

fn mtg_card_key(p: &Payload) -> Result<String, RecordError> {
    let set_id = payload::string_field(p, "sId")?;
    let card_id = payload::string_field(p, "cId")?;
    Ok(format!("{set_id}-{card_id}"))
}

fn pkm_card_key(p: &Payload) -> Result<String, RecordError> {
    Ok(payload::string_field(p, "tcgLandPublicId")?.to_string())
}

/// Descriptive fields followed by the TCGplayer ids, all joined by `-`.
fn pkm_card_slug_source(p: &Payload) -> Result<String, RecordError> {
    let mut parts: Vec<String> = PKM_CARD_SLUG_FIELDS
        .iter()
        .filter_map(|field| payload::optional_string(p, field))
        .map(str::to_string)
        .collect();

    if let Some(Value::Array(ids)) = p.get("tcgPlayerIds") {
        let ids: Vec<String> = ids
            .iter()
            .filter_map(|id| match id {
                Value::Number(n) => Some(integer_text(n)),
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .collect();
        if !ids.is_empty() {
            parts.push(ids.join("-"));
        }
    }

    Ok(parts.join("-"))
}

/// Integer rendering of a JSON number; fractional values are truncated.
fn integer_text(n: &Number) -> String {
    let mut buf = itoa::Buffer::new();
    if let Some(i) = n.as_i64() {
        buf.format(i).to_string()
    } else if let Some(u) = n.as_u64() {
        buf.format(u).to_string()
    } else {
        buf.format(n.as_f64().unwrap_or_default().trunc() as i64)
            .to_string()
    }
}
