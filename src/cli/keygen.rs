//! Reviewer key generation.
//!
//! Prints an enrollment seed and the keypair derived from it. The seed alone
//! is enough to recover the keypair; treat it like the secret key.

use ringtally::crypto::{Lsag, Seed};

pub fn execute(seed: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let seed = match seed {
        Some(hex) => Seed::from_hex(hex.trim())?,
        None => Seed::generate(),
    };

    let (secret, public) = Lsag::derive_keypair(&seed)?;
    let key_image = Lsag.key_image(&secret)?;

    println!("seed:       {}", seed.to_hex().as_str());
    println!("secret key: {}", secret.to_hex().as_str());
    println!("public key: {}", public);
    println!("key image:  {}", key_image);

    Ok(())
}
