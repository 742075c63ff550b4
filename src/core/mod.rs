// Core modules implementing record storage, encoding, joins, and error modeling.
pub mod codec;
pub mod cursor;
pub mod error;
pub mod index;
pub mod join;
pub mod layout;
pub mod schema;
pub mod store;
