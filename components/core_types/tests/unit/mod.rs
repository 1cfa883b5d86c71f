//! Unit test suite for core_types.

mod test_interning;
mod test_table;
mod test_value_ops;
