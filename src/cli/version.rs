use ringtally::codec::{CODEC_VERSION, DOMAIN_TAG};

/// Display version information
pub fn execute() {
    println!("ringtally {}", env!("CARGO_PKG_VERSION"));
    println!("Anonymous reviewer voting with linkable ring signatures");
    println!("vote message format: {} v{}", DOMAIN_TAG, CODEC_VERSION);
}
