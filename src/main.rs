#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

fn main() -> anyhow::Result<()> {
    keyword_warden::run()
}
