pub mod run_date;
