use std::collections::HashMap;

use massing_core::block::{BlockField, BlockUpdate};

use crate::align::{AlignAnchor, AlignAxis, align_selection};
use crate::store::SessionStore;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub store: &'a mut SessionStore,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(AddBlockCommand);
        bus.register(DuplicateSelectionCommand);
        bus.register(RemoveSelectionCommand);
        bus.register(ClearSelectionCommand);
        bus.register(UndoCommand);
        bus.register(RedoCommand);
        bus.register(AlignSelectionCommand);
        bus.register(SetFieldCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct AddBlockCommand;

impl CommandHandler for AddBlockCommand {
    fn name(&self) -> &'static str {
        "add_block"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let id = context.store.add_block();
        CommandResponse::ok(format!("已添加体块 {id}"))
    }
}

/// 复制参考体块（最先选中的体块）。
struct DuplicateSelectionCommand;

impl CommandHandler for DuplicateSelectionCommand {
    fn name(&self) -> &'static str {
        "duplicate_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(reference) = context.store.reference().cloned() else {
            return CommandResponse::err("没有选中的体块");
        };
        match context.store.duplicate_block(&reference) {
            Some(copy) => CommandResponse::ok(format!("已复制体块 {copy}")),
            None => CommandResponse::err("复制失败：体块不存在"),
        }
    }
}

struct RemoveSelectionCommand;

impl CommandHandler for RemoveSelectionCommand {
    fn name(&self) -> &'static str {
        "remove_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let selection = context.store.selection().to_vec();
        if selection.is_empty() {
            return CommandResponse::err("没有选中的体块");
        }
        let removed = selection
            .iter()
            .filter(|id| context.store.remove_block(id))
            .count();
        if removed == 0 {
            CommandResponse::err("未删除任何体块：会话至少保留一个体块")
        } else {
            CommandResponse::ok(format!("已删除 {removed} 个体块"))
        }
    }
}

struct ClearSelectionCommand;

impl CommandHandler for ClearSelectionCommand {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.store.clear_selection();
        CommandResponse::ok("选中集已清空")
    }
}

struct UndoCommand;

impl CommandHandler for UndoCommand {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if context.store.undo() {
            CommandResponse::ok("已撤销")
        } else {
            CommandResponse::err("没有可撤销的操作")
        }
    }
}

struct RedoCommand;

impl CommandHandler for RedoCommand {
    fn name(&self) -> &'static str {
        "redo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if context.store.redo() {
            CommandResponse::ok("已重做")
        } else {
            CommandResponse::err("没有可重做的操作")
        }
    }
}

/// `align_selection <x|y|z> [reference|min|max]`
struct AlignSelectionCommand;

impl CommandHandler for AlignSelectionCommand {
    fn name(&self) -> &'static str {
        "align_selection"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(axis) = request.args.first().and_then(|arg| AlignAxis::parse(arg)) else {
            return CommandResponse::err("用法: align_selection <x|y|z> [reference|min|max]");
        };
        let anchor = match request.args.get(1) {
            Some(arg) => match AlignAnchor::parse(arg) {
                Some(anchor) => anchor,
                None => return CommandResponse::err(format!("未知对齐基准: {arg}")),
            },
            None => AlignAnchor::default(),
        };
        if align_selection(context.store, axis, anchor) {
            CommandResponse::ok(format!("已沿 {axis} 轴对齐"))
        } else {
            CommandResponse::err("对齐未产生变化")
        }
    }
}

/// `set_field <field> <value>`，作用于参考体块，例如 `set_field levels 8`。
struct SetFieldCommand;

impl CommandHandler for SetFieldCommand {
    fn name(&self) -> &'static str {
        "set_field"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let (Some(field), Some(value)) = (request.args.first(), request.args.get(1)) else {
            return CommandResponse::err("用法: set_field <field> <value>");
        };
        let Some(reference) = context.store.reference().cloned() else {
            return CommandResponse::err("没有选中的体块");
        };
        let parsed = match BlockField::parse(field, value) {
            Ok(parsed) => parsed,
            Err(err) => return CommandResponse::err(format!("字段无效: {err}")),
        };
        if context
            .store
            .update_block(&reference, &BlockUpdate::from(parsed))
        {
            CommandResponse::ok(format!("已更新 {field} = {value}"))
        } else {
            CommandResponse::err("更新未生效")
        }
    }
}
