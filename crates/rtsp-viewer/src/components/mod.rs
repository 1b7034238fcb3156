pub mod error_dialog;
pub mod preview;
pub mod url_bar;
