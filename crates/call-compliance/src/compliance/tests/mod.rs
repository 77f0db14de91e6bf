mod common;
mod request;
mod score;
