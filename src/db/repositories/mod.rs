mod articles;
mod profiles;
mod rewards;
