pub mod check;
pub mod run;

use crate::ui;

/// Attach the category description and print its advice
pub(crate) fn engine_error(err: actiongraph::Error) -> anyhow::Error {
    let category = err.category();
    ui::dim(category.advice());
    anyhow::Error::new(err).context(category.description())
}
