//! Write operations run inside a [`crate::transaction::Transaction`]

pub mod associator;
pub mod mutator;

pub use associator::{
    associate, delete_relationship, disassociate, link_with, update_relationship,
};
pub use mutator::{create, delete, update};
