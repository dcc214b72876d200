//! Per-dataset record strategies.
//!
//! A [`Strategy`] is read-only configuration shared by every worker. It
//! bundles one mandatory key extractor, an [`IdentitySource`] and two
//! optional hooks:
//!
//! 1. `mutate` runs first, allow-lists fields and reports what it dropped
//! 2. `key` derives the stable record key from the mutated payload
//! 3. `slug_source` replaces the key as slug input when present
//! 4. the identity source yields the entity UUID (function or namespace)
//!
//! The key extractor and identity source are constructor arguments, so a
//! strategy without them cannot be built. All hooks are `Fn + Send + Sync`
//! and must not mutate shared state.

use crate::error::{ConfigError, RecordError, Stage};
use crate::payload::{self, Payload};
use crate::slug;
use uuid::Uuid;

pub type KeyFn = dyn Fn(&Payload) -> Result<String, RecordError> + Send + Sync;
pub type MutateFn = dyn Fn(&mut Payload) -> Result<Vec<String>, RecordError> + Send + Sync;
pub type SlugSourceFn = dyn Fn(&Payload) -> Result<String, RecordError> + Send + Sync;
pub type EntityIdFn = dyn Fn(&Payload, &str) -> Result<Uuid, RecordError> + Send + Sync;

/// Where entity identifiers come from.
pub enum IdentitySource {
    /// Version-5 UUID of the record key under this namespace
    Namespace(Uuid),
    /// Caller-supplied derivation from the mutated payload and key
    Function(Box<EntityIdFn>),
}

impl IdentitySource {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Payload, &str) -> Result<Uuid, RecordError> + Send + Sync + 'static,
    {
        IdentitySource::Function(Box::new(f))
    }
}

/// Deterministic, namespace-seeded identifier for `key`.
pub fn namespaced_id(namespace: &Uuid, key: &str) -> Uuid {
    Uuid::new_v5(namespace, key.as_bytes())
}

/// Key, slug and identifier computed for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIdentity {
    pub key: String,
    pub slug: String,
    pub entity_id: Uuid,
}

/// A record ready for the store.
#[derive(Debug)]
pub struct PreparedRecord {
    pub identity: DerivedIdentity,
    /// The persisted form: re-encoded when the strategy mutates, original bytes otherwise
    pub payload: Vec<u8>,
    pub ignored_fields: Vec<String>,
}

pub struct Strategy {
    name: String,
    key: Box<KeyFn>,
    mutate: Option<Box<MutateFn>>,
    slug_source: Option<Box<SlugSourceFn>>,
    identity: IdentitySource,
}

impl Strategy {
    pub fn new<K>(name: impl Into<String>, key: K, identity: IdentitySource) -> Self
    where
        K: Fn(&Payload) -> Result<String, RecordError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            key: Box::new(key),
            mutate: None,
            slug_source: None,
            identity,
        }
    }

    pub fn with_mutate<M>(mut self, mutate: M) -> Self
    where
        M: Fn(&mut Payload) -> Result<Vec<String>, RecordError> + Send + Sync + 'static,
    {
        self.mutate = Some(Box::new(mutate));
        self
    }

    pub fn with_slug_source<S>(mut self, slug_source: S) -> Self
    where
        S: Fn(&Payload) -> Result<String, RecordError> + Send + Sync + 'static,
    {
        self.slug_source = Some(Box::new(slug_source));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity_source(&self) -> &IdentitySource {
        &self.identity
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.identity {
            IdentitySource::Namespace(ns) if ns.is_nil() => Err(ConfigError::NilNamespace),
            _ => Ok(()),
        }
    }

    pub fn entity_id(&self, payload: &Payload, key: &str) -> Result<Uuid, RecordError> {
        match &self.identity {
            IdentitySource::Namespace(ns) => Ok(namespaced_id(ns, key)),
            IdentitySource::Function(f) => f(payload, key),
        }
    }

    /// Runs decode, mutate, key, slug and identifier derivation for one line.
    ///
    /// The slug returned here is this crate's normalization only; the store's
    /// canonical rule is applied by the caller.
    pub fn prepare(&self, raw: Vec<u8>) -> Result<PreparedRecord, (Stage, RecordError)> {
        let mut record = payload::decode(&raw).map_err(|e| (Stage::Decode, e))?;

        let (payload_bytes, ignored_fields) = match &self.mutate {
            Some(mutate) => {
                let ignored = mutate(&mut record).map_err(|e| (Stage::Mutate, e))?;
                let encoded = payload::encode(&record).map_err(|e| (Stage::Encode, e))?;
                (encoded, ignored)
            }
            None => (raw, Vec::new()),
        };

        let key = (self.key)(&record).map_err(|e| (Stage::Key, e))?;
        if key.is_empty() {
            return Err((Stage::Key, RecordError::Invalid("empty key".to_string())));
        }

        let slug = match &self.slug_source {
            Some(derive) => {
                let source = derive(&record).map_err(|e| (Stage::Slug, e))?;
                slug::slugify(&source)
            }
            None => slug::slugify(&key),
        }
        .map_err(|e| (Stage::Slug, RecordError::from(e)))?;

        let entity_id = self
            .entity_id(&record, &key)
            .map_err(|e| (Stage::EntityId, e))?;

        Ok(PreparedRecord {
            identity: DerivedIdentity {
                key,
                slug,
                entity_id,
            },
            payload: payload_bytes,
            ignored_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn ns() -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, b"strategy-tests")
    }

    fn composite_key(p: &Payload) -> Result<String, RecordError> {
        Ok(format!(
            "{}-{}",
            payload::string_field(p, "sId")?,
            payload::string_field(p, "cId")?
        ))
    }

    #[test]
    fn key_reused_as_slug_source() {
        let strategy = Strategy::new("cards", composite_key, IdentitySource::Namespace(ns()));
        let raw = br#"{"sId":"SET1","cId":"C001","name":"Bolt"}"#.to_vec();
        let prepared = strategy.prepare(raw.clone()).unwrap();
        assert_eq!(prepared.identity.key, "SET1-C001");
        assert_eq!(prepared.identity.slug, "set1-c001");
        assert_eq!(prepared.identity.entity_id, namespaced_id(&ns(), "SET1-C001"));
        assert_eq!(prepared.payload, raw);
        assert!(prepared.ignored_fields.is_empty());
    }

    #[test]
    fn identifier_is_deterministic() {
        let a = namespaced_id(&ns(), "SET1-C001");
        let b = namespaced_id(&ns(), "SET1-C001");
        let c = namespaced_id(&ns(), "SET1-C002");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn mutate_runs_before_key_and_reencodes() {
        let strategy = Strategy::new(
            "names",
            |p: &Payload| Ok(payload::string_field(p, "name")?.to_string()),
            IdentitySource::Namespace(ns()),
        )
        .with_mutate(|p: &mut Payload| Ok(payload::retain_fields(p, &["name"])));

        let prepared = strategy
            .prepare(br#"{"name":"Bolt","extra":"x"}"#.to_vec())
            .unwrap();
        assert_eq!(prepared.ignored_fields, vec!["extra"]);
        let persisted: Value = serde_json::from_slice(&prepared.payload).unwrap();
        assert_eq!(persisted, json!({"name": "Bolt"}));
    }

    #[test]
    fn key_sees_mutated_payload() {
        let strategy = Strategy::new(
            "stripped",
            |p: &Payload| Ok(payload::string_field(p, "id")?.to_string()),
            IdentitySource::Namespace(ns()),
        )
        .with_mutate(|p: &mut Payload| Ok(payload::retain_fields(p, &["name"])));

        let err = strategy
            .prepare(br#"{"id":"x","name":"Bolt"}"#.to_vec())
            .unwrap_err();
        assert_eq!(err.0, Stage::Key);
        assert!(matches!(err.1, RecordError::MissingField(f) if f == "id"));
    }

    #[test]
    fn slug_source_overrides_key() {
        let strategy = Strategy::new("cards", composite_key, IdentitySource::Namespace(ns()))
            .with_slug_source(|p: &Payload| Ok(payload::string_field(p, "name")?.to_string()));
        let prepared = strategy
            .prepare(br#"{"sId":"SET1","cId":"C001","name":"Lightning Bolt"}"#.to_vec())
            .unwrap();
        assert_eq!(prepared.identity.key, "SET1-C001");
        assert_eq!(prepared.identity.slug, "lightning-bolt");
    }

    #[test]
    fn entity_id_function_takes_precedence() {
        let fixed = Uuid::from_u128(42);
        let strategy = Strategy::new(
            "fixed",
            composite_key,
            IdentitySource::function(move |_, _| Ok(fixed)),
        );
        let prepared = strategy
            .prepare(br#"{"sId":"S","cId":"C"}"#.to_vec())
            .unwrap();
        assert_eq!(prepared.identity.entity_id, fixed);
    }

    #[test]
    fn empty_slug_is_a_slug_stage_failure() {
        let strategy = Strategy::new(
            "punct",
            |p: &Payload| Ok(payload::string_field(p, "id")?.to_string()),
            IdentitySource::Namespace(ns()),
        );
        let err = strategy.prepare(br#"{"id":"!!!"}"#.to_vec()).unwrap_err();
        assert_eq!(err.0, Stage::Slug);
        assert!(matches!(err.1, RecordError::EmptySlug(_)));
    }

    #[test]
    fn malformed_json_is_a_decode_failure() {
        let strategy = Strategy::new("cards", composite_key, IdentitySource::Namespace(ns()));
        let err = strategy.prepare(b"{\"sId\":".to_vec()).unwrap_err();
        assert_eq!(err.0, Stage::Decode);
    }

    #[test]
    fn nil_namespace_rejected() {
        let strategy = Strategy::new(
            "cards",
            composite_key,
            IdentitySource::Namespace(Uuid::nil()),
        );
        assert_eq!(strategy.validate(), Err(ConfigError::NilNamespace));
        let ok = Strategy::new("cards", composite_key, IdentitySource::Namespace(ns()));
        assert!(ok.validate().is_ok());
    }
}
