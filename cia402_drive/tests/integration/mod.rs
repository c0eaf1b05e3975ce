mod catalog_files;
mod pairing;
mod status_sequences;
