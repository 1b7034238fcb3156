pub mod fake_media;
