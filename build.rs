use vergen::EmitBuilder;

fn main() {
    // Outside a git checkout (e.g. release tarballs) fall back to the bare
    // crate version.
    if EmitBuilder::builder()
        .git_describe(true, true, None)
        .emit()
        .is_err()
    {
        println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=");
    }
}
