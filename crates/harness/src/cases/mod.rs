pub mod rep_outs;
