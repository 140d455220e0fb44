mod lifecycle;
mod settings;
