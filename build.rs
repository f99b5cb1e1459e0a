use shadow_rs::{SdResult, ShadowBuilder};

/// Build metadata behind `beacon-rs --version`.
fn main() -> SdResult<()> {
    ShadowBuilder::builder().build()?;
    Ok(())
}
