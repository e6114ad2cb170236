mod offline_download;
mod registry;
