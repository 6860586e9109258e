//! Session dataset schema
//!
//! - `table`: typed CSV loading of the raw session table
//! - `roles`: column role inference and the frozen, versioned feature schema

pub mod roles;
pub mod table;

pub use roles::{
    is_motor_candidate, FeatureSchema, EXCLUDED_CONDITION_COLUMNS, FEATURE_SCHEMA_VERSION,
    MOTOR_PREFIXES, REACTION_TIME_ANCHOR,
};
pub use table::{
    Column, ColumnData, ColumnKind, SessionTable, ID_COLUMNS, PARTICIPANT_ID_COLUMN,
    SESSION_ID_COLUMN,
};
