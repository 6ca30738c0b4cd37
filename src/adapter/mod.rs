pub mod chromiumoxide;
