//! # Help Text
//!
//! Help message listing provider prefixes and session commands.
//! Displayed to the user via `/help`.

pub const MAIN: &str = concat!(
    "**📖 Switchyard Help**\n",
    "\n",
    "**🤖 API layer (fast answers)**\n",
    "* @claude or @claude-api: Claude API\n",
    "* @gemini or @gemini-api: Gemini API\n",
    "* @openai or @gpt: OpenAI API\n",
    "\n",
    "**💻 CLI layer (works on the code base)**\n",
    "* @code or @claude-cli: Claude Code CLI\n",
    "* @gemini-cli: Gemini CLI\n",
    "\n",
    "**💡 Smart routing**\n",
    "Without a prefix the bot picks the layer from your message and uses the default provider.\n",
    "\n",
    "**📝 Sessions**\n",
    "* /new or 新会话: start a new session and clear history\n",
    "* /session or 会话信息: show the current session\n",
    "* /history or 历史记录: show the conversation history\n",
    "* /help or 帮助: show this help\n",
    "\n",
    "**💬 Examples**\n",
    "* @claude what is a monad?\n",
    "* @code show the project structure\n",
    "* what is Python? (routed automatically)\n"
);
