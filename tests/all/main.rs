mod clients;
mod handlers;
mod helpers;
