//! Todo list component, built as a wasm module.
//!
//! ```text
//! cargo build --release --target wasm32-unknown-unknown --example todolist
//! ```
//!
//! The host renders `todo-list` > (h1, form > (input, button), ul > li*) and
//! echoes clicks and keystrokes back by element index.

use spark_wasm::{Component, ElementRef, Result, Ui, export_component};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Default)]
pub struct TodoList {
    pub todos: Vec<Todo>,
    pub draft: String,
    pub has_error: bool,
}

impl TodoList {
    pub fn edit(&mut self, text: &str) {
        self.draft = text.to_string();
        self.has_error = false;
    }

    pub fn add(&mut self) {
        let text = self.draft.trim();
        if text.is_empty() {
            self.has_error = true;
            return;
        }
        self.todos.push(Todo {
            text: text.to_string(),
            done: false,
        });
        self.draft.clear();
        self.has_error = false;
    }

    pub fn toggle(&mut self, index: usize) {
        if let Some(todo) = self.todos.get_mut(index) {
            todo.done = !todo.done;
        }
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.todos.len() {
            self.todos.remove(index);
        }
    }

    pub fn remaining(&self) -> usize {
        self.todos.iter().filter(|todo| !todo.done).count()
    }
}

impl Component for TodoList {
    fn render<'r>(&self, ui: &Ui<'r, Self>) -> Result<ElementRef<'r>> {
        let title = ui.text_element("h1", "Todos")?;

        let input = ui.input("Enter a new todo", |app: &mut TodoList, text| app.edit(text))?;
        ui.set_text(input, &self.draft)?;
        if self.has_error {
            ui.attributes(input, &["class", "error", "aria-invalid", "true"])?;
        }
        let add = ui.class(ui.button("Add", |app: &mut TodoList| app.add())?, "primary")?;
        let form = ui.element("form", &[input, add])?;

        let mut items = Vec::with_capacity(self.todos.len());
        for (i, todo) in self.todos.iter().enumerate() {
            let label = ui.button(&todo.text, move |app: &mut TodoList| app.toggle(i))?;
            let remove = ui.class(ui.button("×", move |app: &mut TodoList| app.remove(i))?, "remove")?;
            let item = ui.element("li", &[label, remove])?;
            if todo.done {
                ui.class(item, "done")?;
            }
            items.push(item);
        }
        let list = ui.element("ul", &items)?;

        let footer = ui.text_element("p", ui.format(format_args!("{} left", self.remaining()))?)?;

        ui.element("todo-list", &[title, form, list, footer])
    }
}

export_component!(TodoList);
