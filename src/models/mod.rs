pub mod answer;
pub mod audit_log;
pub mod question;
pub mod test_attempt;
