pub mod temp_store;
