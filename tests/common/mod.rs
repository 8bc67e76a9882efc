//! Sample poll domain shared by the integration tests.
//!
//! Users belong to groups, questions are authored by users, and choices
//! belong to questions and remember who voted for them. `Bar` is registered
//! with no functions at all.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use instcache::cache::codec::{DATE, DATETIME, PK, PK_LIST};
use instcache::cache::{
    BackendError, BoxError, CacheBackend, CacheConfig, CacheError, FieldCodecs, InstanceCache,
    Invalidation, Loader, MemoryBackend, PassThroughCodec, Registration, Registry, invalidator_fn,
    loader_fn,
};
use instcache::domain::{
    KeyOnlyCollection, KeyOnlyReference, PrimaryKey, Representation, TypeDescriptor,
};

pub const USER: &str = "User";
pub const GROUP: &str = "Group";
pub const QUESTION: &str = "Question";
pub const CHOICE: &str = "Choice";
pub const BAR: &str = "Bar";

pub const STATS_KEY: &str = "stats_count_key";

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub joined: OffsetDateTime,
    pub group_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub member_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub pub_date: Date,
    pub author_id: i64,
    pub choice_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub voter_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(User),
    Group(Group),
    Question(Question),
    Choice(Choice),
    Bar { id: i64 },
}

impl Record {
    pub fn type_name(&self) -> &'static str {
        match self {
            Record::User(_) => USER,
            Record::Group(_) => GROUP,
            Record::Question(_) => QUESTION,
            Record::Choice(_) => CHOICE,
            Record::Bar { .. } => BAR,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Record::User(user) => user.id,
            Record::Group(group) => group.id,
            Record::Question(question) => question.id,
            Record::Choice(choice) => choice.id,
            Record::Bar { id } => *id,
        }
    }
}

pub fn user(id: i64, username: &str, joined_unix: i64) -> User {
    User {
        id,
        username: username.to_string(),
        joined: OffsetDateTime::from_unix_timestamp(joined_unix).expect("valid timestamp"),
        group_ids: Vec::new(),
    }
}

pub fn user_type() -> TypeDescriptor {
    TypeDescriptor::new("auth", USER)
}

pub fn group_type() -> TypeDescriptor {
    TypeDescriptor::new("auth", GROUP)
}

pub fn question_type() -> TypeDescriptor {
    TypeDescriptor::new("polls", QUESTION)
}

pub fn choice_type() -> TypeDescriptor {
    TypeDescriptor::new("polls", CHOICE)
}

/// The backing store: records by type and id, counting every load.
#[derive(Default)]
pub struct PollStore {
    rows: Mutex<HashMap<(&'static str, i64), Record>>,
    loads: Mutex<HashMap<&'static str, usize>>,
}

impl PollStore {
    pub fn insert(&self, record: Record) {
        self.rows
            .lock()
            .expect("rows lock")
            .insert((record.type_name(), record.id()), record);
    }

    pub fn remove(&self, type_name: &'static str, id: i64) -> Option<Record> {
        self.rows.lock().expect("rows lock").remove(&(type_name, id))
    }

    pub fn load(&self, type_name: &'static str, key: &PrimaryKey) -> Option<Record> {
        *self
            .loads
            .lock()
            .expect("loads lock")
            .entry(type_name)
            .or_default() += 1;
        let id = key.as_i64()?;
        self.rows
            .lock()
            .expect("rows lock")
            .get(&(type_name, id))
            .cloned()
    }

    pub fn load_count(&self, type_name: &str) -> usize {
        self.loads
            .lock()
            .expect("loads lock")
            .get(type_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().expect("loads lock").values().sum()
    }
}

/// A memory backend that also counts calls per operation.
#[derive(Default)]
pub struct RecordingBackend {
    pub inner: MemoryBackend,
    gets: AtomicUsize,
    get_manys: AtomicUsize,
    sets: AtomicUsize,
    set_manys: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn get_many_calls(&self) -> usize {
        self.get_manys.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn set_many_calls(&self) -> usize {
        self.set_manys.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.get_calls()
            + self.get_many_calls()
            + self.set_calls()
            + self.set_many_calls()
            + self.deleted_keys().len()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.peek(key)
    }

    pub fn raw_json(&self, key: &str) -> Option<serde_json::Value> {
        self.raw(key)
            .map(|raw| serde_json::from_str(&raw).expect("cached value is JSON"))
    }
}

#[async_trait]
impl CacheBackend for RecordingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, String>, BackendError> {
        self.get_manys.fetch_add(1, Ordering::SeqCst);
        self.inner.get_many(keys).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BackendError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn set_many(&self, entries: HashMap<String, String>) -> Result<(), BackendError> {
        self.set_manys.fetch_add(1, Ordering::SeqCst);
        self.inner.set_many(entries).await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(key.to_string());
        self.inner.delete(key).await
    }
}

pub fn codecs() -> FieldCodecs {
    FieldCodecs::with_types([user_type(), group_type(), question_type(), choice_type()])
        .with_codec("Str", PassThroughCodec)
        .expect("valid type code")
}

fn serialize_user(
    record: Option<&Record>,
    codecs: &FieldCodecs,
) -> Result<Option<Representation>, CacheError> {
    let Some(Record::User(user)) = record else {
        return Ok(None);
    };
    let representation = codecs
        .representation()
        .field("id", user.id)?
        .typed("Str", "username", user.username.as_str())?
        .typed(DATETIME, "joined", user.joined)?
        .build();
    Ok(Some(representation))
}

fn serialize_group(
    record: Option<&Record>,
    codecs: &FieldCodecs,
) -> Result<Option<Representation>, CacheError> {
    let Some(Record::Group(group)) = record else {
        return Ok(None);
    };
    let representation = codecs
        .representation()
        .field("id", group.id)?
        .field("name", group.name.as_str())?
        .typed(
            PK_LIST,
            "members",
            KeyOnlyCollection::new(user_type(), group.member_ids.clone()),
        )?
        .build();
    Ok(Some(representation))
}

fn serialize_question(
    record: Option<&Record>,
    codecs: &FieldCodecs,
) -> Result<Option<Representation>, CacheError> {
    let Some(Record::Question(question)) = record else {
        return Ok(None);
    };
    let representation = codecs
        .representation()
        .field("id", question.id)?
        .field("text", question.text.as_str())?
        .typed(DATE, "pub_date", question.pub_date)?
        .typed(
            PK,
            "author",
            KeyOnlyReference::new(user_type(), question.author_id),
        )?
        .typed(
            PK_LIST,
            "choices",
            KeyOnlyCollection::new(choice_type(), question.choice_ids.clone()),
        )?
        .build();
    Ok(Some(representation))
}

fn serialize_choice(
    record: Option<&Record>,
    codecs: &FieldCodecs,
) -> Result<Option<Representation>, CacheError> {
    let Some(Record::Choice(choice)) = record else {
        return Ok(None);
    };
    let representation = codecs
        .representation()
        .field("id", choice.id)?
        .typed(
            PK,
            "question",
            KeyOnlyReference::new(question_type(), choice.question_id),
        )?
        .field("text", choice.text.as_str())?
        .field("votes", choice.voter_ids.len() as i64)?
        .build();
    Ok(Some(representation))
}

fn store_loader(
    store: &Arc<PollStore>,
    type_name: &'static str,
) -> impl Loader<Record> + use<> {
    let store = store.clone();
    loader_fn(move |key: PrimaryKey| {
        let store = store.clone();
        async move { Ok::<_, BoxError>(store.load(type_name, &key)) }
    })
}

/// Every registration of the poll domain, bound under each of `versions`.
pub fn registry(store: &Arc<PollStore>, versions: &[String]) -> Registry<Record> {
    let user = Registration::new()
        .serializer(serialize_user)
        .loader(store_loader(store, USER))
        .invalidator(invalidator_fn(|record: &Record| {
            let mut invalidations = vec![Invalidation::cache_key(STATS_KEY)];
            if let Record::User(user) = record {
                invalidations.extend(
                    user.group_ids
                        .iter()
                        .map(|group| Invalidation::deferred(GROUP, *group)),
                );
            }
            async move { Ok::<_, BoxError>(invalidations) }
        }));

    let group = Registration::new()
        .serializer(serialize_group)
        .loader(store_loader(store, GROUP))
        .invalidator(invalidator_fn(|record: &Record| {
            let invalidations: Vec<Invalidation> = match record {
                Record::Group(group) => group
                    .member_ids
                    .iter()
                    .map(|member| Invalidation::deferred(USER, *member))
                    .collect(),
                _ => Vec::new(),
            };
            async move { Ok::<_, BoxError>(invalidations) }
        }));

    let question = Registration::new()
        .serializer(serialize_question)
        .loader(store_loader(store, QUESTION));

    let choice = Registration::new()
        .serializer(serialize_choice)
        .loader(store_loader(store, CHOICE))
        .invalidator(invalidator_fn(|record: &Record| {
            let invalidations: Vec<Invalidation> = match record {
                Record::Choice(choice) => std::iter::once(Invalidation::immediate(
                    QUESTION,
                    choice.question_id,
                ))
                .chain(
                    choice
                        .voter_ids
                        .iter()
                        .map(|voter| Invalidation::deferred(USER, *voter)),
                )
                .collect(),
                _ => Vec::new(),
            };
            async move { Ok::<_, BoxError>(invalidations) }
        }));

    Registry::builder()
        .register_versions(USER, versions.iter().cloned(), user)
        .register_versions(GROUP, versions.iter().cloned(), group)
        .register_versions(QUESTION, versions.iter().cloned(), question)
        .register_versions(CHOICE, versions.iter().cloned(), choice)
        .register_versions(BAR, versions.iter().cloned(), Registration::unmanaged())
        .build()
}

pub struct Fixture {
    pub store: Arc<PollStore>,
    pub backend: Arc<RecordingBackend>,
    pub cache: Arc<InstanceCache<Record>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let store = Arc::new(PollStore::default());
        let backend = Arc::new(RecordingBackend::default());
        let cache = InstanceCache::new(
            &config,
            backend.clone(),
            registry(&store, &config.versions),
            codecs(),
        )
        .expect("valid cache");

        Self {
            store,
            backend,
            cache: Arc::new(cache),
        }
    }

    pub fn key(&self, type_name: &str, id: i64) -> String {
        self.cache
            .key_for(self.cache.default_version(), type_name, &PrimaryKey::Int(id))
    }
}
