//! Save file listing.

use tabled::Tabled;

use miniboard_core::SaveFile;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::{Remote, util};

#[derive(Tabled)]
struct SaveRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Modified")]
    date: String,
    #[tabled(rename = "Size")]
    size: String,
}

impl From<&SaveFile> for SaveRow {
    fn from(s: &SaveFile) -> Self {
        Self {
            name: s.name.clone(),
            date: s.date.clone(),
            size: s.size.clone(),
        }
    }
}

/// Saves are listed on every connect, ahead of the instance listing, so the
/// loaded board already carries them.
pub async fn handle(remote: &Remote, global: &GlobalOpts) -> Result<(), CliError> {
    let view = util::loaded_board(remote).await?;
    let out = output::render_list(&global.output, &view.saves, |s| SaveRow::from(s), |s| {
        s.name.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
