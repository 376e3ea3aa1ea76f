pub(crate) mod scope_guard;
