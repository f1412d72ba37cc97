#![forbid(unsafe_code)]

pub mod users_list;
