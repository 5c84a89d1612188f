mod add;
mod install;
mod list;
mod remove;

pub(crate) use add::cmd_add;
pub(crate) use install::cmd_install;
pub(crate) use list::cmd_list;
pub(crate) use remove::cmd_remove;
