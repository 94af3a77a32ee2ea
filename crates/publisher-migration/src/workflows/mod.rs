pub mod publishers;
