pub(crate) mod env;
mod slab;

pub(crate) use slab::Slab;
