#![expect(clippy::print_stdout, reason = "prints generated credentials")]

use sealdrop_protocol::{AccessToken, SharedSecret};

/// Prints config entries with freshly generated credentials.
fn main() -> anyhow::Result<()> {
    println!(
        "shared_secret: \"{}\",",
        SharedSecret::generate()?.display_unmasked()
    );
    println!(
        "access_token: \"{}\",",
        AccessToken::generate()?.as_unmasked_str()
    );
    Ok(())
}
