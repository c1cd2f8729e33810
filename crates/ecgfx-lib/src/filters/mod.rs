pub mod butterworth;
