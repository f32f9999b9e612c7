//! Property-based test generators using proptest.
//!
//! Provides strategies for values, documents and session operation
//! sequences that respect the reference registry in [`crate::fixtures`].

use chrono::NaiveDate;
use proptest::prelude::*;
use saldb_core::{ObjectId, Value};

/// Strategy for generating object IDs.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    prop::array::uniform16(any::<u8>()).prop_map(ObjectId::from_bytes)
}

/// Strategy for generating dates between 1990 and 2040.
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..18_262).prop_map(|days| {
        NaiveDate::from_ymd_opt(1990, 1, 1).expect("valid date") + chrono::Days::new(days)
    })
}

/// Strategy for generating short titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,23}").expect("Invalid regex")
}

/// Strategy for generating body text made of a few lowercase words.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 1..6).prop_map(|words| words.join(" "))
}

/// Vocabulary used by [`text_strategy`].
pub const WORDS: &[&str] = &[
    "archive", "index", "revision", "folder", "schema", "query", "commit", "tag",
];

/// Strategy for generating scalar values of any kind.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        title_strategy().prop_map(Value::Text),
        date_strategy().prop_map(Value::Date),
        object_id_strategy().prop_map(Value::Reference),
    ]
}

/// One step of a session workload.
///
/// Object slots are indexes into the list of documents created so far and
/// wrap around; operations naming a slot are skipped while the list is
/// empty.
#[derive(Debug, Clone)]
pub enum SessionOp {
    /// Create and attach a document.
    Create {
        /// Document title.
        title: String,
        /// Creation date.
        created: NaiveDate,
    },
    /// Change the creation date of a document.
    Update {
        /// Document slot.
        slot: usize,
        /// New creation date.
        created: NaiveDate,
    },
    /// Remove a document.
    Remove {
        /// Document slot.
        slot: usize,
    },
    /// Commit the staged changes.
    Commit,
}

/// Strategy for generating session operations.
pub fn session_op_strategy() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        3 => (title_strategy(), date_strategy())
            .prop_map(|(title, created)| SessionOp::Create { title, created }),
        2 => (any::<usize>(), date_strategy())
            .prop_map(|(slot, created)| SessionOp::Update { slot, created }),
        1 => any::<usize>().prop_map(|slot| SessionOp::Remove { slot }),
        2 => Just(SessionOp::Commit),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn session_op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<SessionOp>> {
    prop::collection::vec(session_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
