//! Unit test suite for bytecode_system.

mod test_roundtrip;
