mod merge;
mod persistence;
