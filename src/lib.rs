// Library exports for clonedef
pub mod airr;
pub mod assign;
pub mod cluster;
pub mod distance;
pub mod preclone;
pub mod record;
pub mod report;
pub mod union_find;
