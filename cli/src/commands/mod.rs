mod helpers;
mod meal;
mod widget;

pub(crate) use meal::{cmd_add, cmd_list, cmd_remove};
pub(crate) use widget::{WidgetAction, cmd_widget};
