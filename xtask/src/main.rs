/// The xtask binary delegates entirely to nih_plug_xtask, which provides
/// the `bundle` subcommand. Usage:
///
///   cargo xtask bundle echoform --release
///
/// This compiles the plugin as a cdylib and packages it into
/// `target/bundled/Echoform.vst3` and `target/bundled/Echoform.clap`.
fn main() -> nih_plug_xtask::Result<()> {
    nih_plug_xtask::main()
}
