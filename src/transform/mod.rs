//! Adapters from E-MIS business items into lookup options.

pub(crate) mod option;
